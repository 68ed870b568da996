use notify::{RecommendedWatcher, RecursiveMode, Watcher as _};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

use crate::error::{ConsoleError, ConsoleResult};
use crate::session::{key_digest, selection_storage_key, SessionId};

/// Durable string storage keyed by string, shared by every handle that
/// points at the same backing location.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> ConsoleResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> ConsoleResult<()>;
}

/// One JSON file per key under `root`, named by the key's digest.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store rooted at `<state_dir>/selection`.
    pub fn in_state_dir(state_dir: &Path) -> Self {
        Self::new(state_dir.join("selection"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", key_digest(key)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> ConsoleResult<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(ConsoleError::storage(err)),
        }
    }

    /// Write-to-temp-then-rename so readers never see a partial file.
    fn set(&self, key: &str, value: &str) -> ConsoleResult<()> {
        let path = self.path_for(key);
        std::fs::create_dir_all(&self.root).map_err(ConsoleError::storage)?;
        let tmp_path = self
            .root
            .join(format!("{}.{}.tmp", key_digest(key), uuid::Uuid::new_v4()));
        std::fs::write(&tmp_path, value).map_err(ConsoleError::storage)?;
        std::fs::rename(&tmp_path, &path).map_err(|err| {
            let _ = std::fs::remove_file(&tmp_path);
            ConsoleError::storage(err)
        })
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> ConsoleResult<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| ConsoleError::storage("memory store poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> ConsoleResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| ConsoleError::storage("memory store poisoned"))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Persisted selection for one workspace. Fields written by other tools are
/// carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_key: Option<String>,
    #[serde(default)]
    pub selected_session_id: Option<SessionId>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Broadcast whenever a handle persists a new selection.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionEvent {
    pub workspace_key: String,
    pub state: SelectionState,
    pub origin: u64,
}

const BUS_CAPACITY: usize = 64;

const WATCH_DEBOUNCE: Duration = Duration::from_millis(200);

/// Origin of events seen through the file watcher. Handle origins start at 1.
pub const EXTERNAL_ORIGIN: u64 = 0;

static NEXT_ORIGIN: AtomicU64 = AtomicU64::new(1);

/// Live filesystem watch on a `FileStore` root. Dropping it stops the watch.
pub struct StoreWatcher {
    _debouncer: Debouncer<RecommendedWatcher>,
}

impl std::fmt::Debug for StoreWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreWatcher").finish_non_exhaustive()
    }
}

/// Selection files touched by one debounced batch. Temp files are skipped.
fn changed_selection_files(paths: impl IntoIterator<Item = PathBuf>) -> BTreeSet<PathBuf> {
    paths
        .into_iter()
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect()
}

/// Decode a selection file written by any process into a bus event.
fn external_event(path: &Path) -> Option<SelectionEvent> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "selection file vanished");
            return None;
        }
    };
    let state: SelectionState = match serde_json::from_str(&raw) {
        Ok(state) => state,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "ignoring corrupt selection file");
            return None;
        }
    };
    let workspace_key = state.workspace_key.clone()?;
    Some(SelectionEvent {
        workspace_key,
        state,
        origin: EXTERNAL_ORIGIN,
    })
}

/// Reads and writes persisted selection and fans changes out to every
/// sibling handle sharing the same store.
pub struct SelectionSync {
    store: Arc<dyn KeyValueStore>,
    bus: broadcast::Sender<SelectionEvent>,
    origin: u64,
    last_persisted: Option<(String, Option<SessionId>)>,
}

impl SelectionSync {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let (bus, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            store,
            bus,
            origin: NEXT_ORIGIN.fetch_add(1, Ordering::Relaxed),
            last_persisted: None,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Another handle on the same store and bus, with its own dedup cache.
    pub fn sibling(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            bus: self.bus.clone(),
            origin: NEXT_ORIGIN.fetch_add(1, Ordering::Relaxed),
            last_persisted: None,
        }
    }

    pub fn origin(&self) -> u64 {
        self.origin
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SelectionEvent> {
        self.bus.subscribe()
    }

    /// Publish selection files written to `store` by other processes onto
    /// this handle's bus, tagged with `EXTERNAL_ORIGIN`. This process's own
    /// writes come through as well.
    pub fn watch_files(&self, store: &FileStore) -> ConsoleResult<StoreWatcher> {
        std::fs::create_dir_all(store.root()).map_err(ConsoleError::storage)?;

        let bus = self.bus.clone();
        let mut debouncer = new_debouncer(WATCH_DEBOUNCE, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    let paths = changed_selection_files(events.into_iter().map(|e| e.path));
                    for event in paths.iter().filter_map(|path| external_event(path)) {
                        // No subscribers is not an error.
                        let _ = bus.send(event);
                    }
                }
                Err(err) => tracing::warn!(error = %err, "selection watch failed"),
            }
        })
        .map_err(ConsoleError::storage)?;

        debouncer
            .watcher()
            .watch(store.root(), RecursiveMode::NonRecursive)
            .map_err(ConsoleError::storage)?;
        tracing::debug!(root = %store.root().display(), "watching selection files");

        Ok(StoreWatcher {
            _debouncer: debouncer,
        })
    }

    /// Persisted state for `workspace_key`, or an empty state when nothing
    /// usable is stored.
    pub fn read(&self, workspace_key: &str) -> SelectionState {
        let key = selection_storage_key(workspace_key);
        match self.store.get(&key) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                tracing::warn!(%key, error = %err, "discarding corrupt selection state");
                SelectionState::default()
            }),
            Ok(None) => SelectionState::default(),
            Err(err) => {
                tracing::warn!(%key, error = %err, "failed to read selection state");
                SelectionState::default()
            }
        }
    }

    /// Merge the selection into stored state and broadcast it. Returns
    /// `false` when the value matches what this handle last persisted.
    pub fn persist(&mut self, workspace_key: &str, selected: Option<&SessionId>) -> bool {
        if let Some((key, id)) = &self.last_persisted {
            if key == workspace_key && id.as_ref() == selected {
                return false;
            }
        }

        let mut state = self.read(workspace_key);
        state.workspace_key = Some(workspace_key.to_string());
        state.selected_session_id = selected.cloned();

        let storage_key = selection_storage_key(workspace_key);
        let written = serde_json::to_string(&state)
            .map_err(ConsoleError::storage)
            .and_then(|json| self.store.set(&storage_key, &json));
        match written {
            Ok(()) => {
                self.last_persisted = Some((workspace_key.to_string(), selected.cloned()));
            }
            Err(err) => {
                tracing::warn!(key = %storage_key, error = %err, "failed to persist selection");
            }
        }

        // No subscribers is not an error.
        let _ = self.bus.send(SelectionEvent {
            workspace_key: workspace_key.to_string(),
            state,
            origin: self.origin,
        });
        true
    }

    /// Record a selection received from a sibling so it is not written back.
    pub fn remember(&mut self, workspace_key: &str, selected: Option<&SessionId>) {
        self.last_persisted = Some((workspace_key.to_string(), selected.cloned()));
    }
}

impl std::fmt::Debug for SelectionSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionSync")
            .field("origin", &self.origin)
            .field("last_persisted", &self.last_persisted)
            .finish_non_exhaustive()
    }
}
