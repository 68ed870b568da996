#![no_main]
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

use tether::persist::{FileStore, KeyValueStore, SelectionSync};
use tether::session::{selection_storage_key, SessionId};

fuzz_target!(|data: &[u8]| {
    // Whatever is on disk, reading must not panic and persisting must win.
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::new(dir.path()));
    let raw = String::from_utf8_lossy(data);
    store.set(&selection_storage_key("/ws"), &raw).unwrap();

    let mut sync = SelectionSync::new(store);
    let _ = sync.read("/ws");
    sync.persist("/ws", Some(&SessionId::new("s1")));
    assert_eq!(
        sync.read("/ws").selected_session_id,
        Some(SessionId::new("s1"))
    );
});
