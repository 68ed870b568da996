#![no_main]
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

use tether::transcript::{empty_transcript, reconcile, TranscriptEntry};

fuzz_target!(|data: &[u8]| {
    // Arbitrary JSON arrays of entries, split in two to model consecutive polls.
    let Ok(entries) = serde_json::from_slice::<Vec<TranscriptEntry>>(data) else {
        return;
    };
    let split = entries.len() / 2;

    let first = reconcile(&empty_transcript(), &entries[..split]);
    let second = reconcile(&first, &entries);
    assert_eq!(second.len(), entries.len());

    // Reconciling the same input again must hand back the same value.
    let again = reconcile(&second, &entries);
    assert!(Arc::ptr_eq(&second, &again));
});
