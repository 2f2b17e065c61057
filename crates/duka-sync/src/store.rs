//! # Durable Queue Store
//!
//! Persists the pending-operation queue across restarts as one JSON array.
//!
//! ## Snapshot Semantics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  There is no partial update. Every mutation writes the whole queue.     │
//! │                                                                         │
//! │   save(&[op1, op2, op3])                                               │
//! │        │                                                                │
//! │        ├── serialize ──► offline_queue.json.tmp   (mode 0600)          │
//! │        ├── fsync                                                        │
//! │        └── rename    ──► offline_queue.json       (atomic replace)     │
//! │                                                                         │
//! │   load()                                                               │
//! │        ├── file missing   ──► []                                       │
//! │        ├── valid JSON     ──► [op1, op2, op3]                          │
//! │        └── corrupt        ──► [] + warn! (never fatal)                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};
use duka_core::QueuedOperation;

/// Well-known storage key of the pending queue.
pub const QUEUE_KEY: &str = "offline_queue";

/// File name of the pending queue inside the data directory.
pub const QUEUE_FILE: &str = "offline_queue.json";

/// File name of dead-lettered operations inside the data directory.
pub const DEAD_LETTER_FILE: &str = "offline_queue.dead.json";

/// Whole-snapshot storage for queued operations.
///
/// Implementations are synchronous; callers serialize access themselves
/// (the queue manager holds one lock around every load/save pair).
pub trait QueueStore: Send + Sync {
    /// Reads the full snapshot, oldest first. Never fails: unreadable
    /// content is logged and reported as empty.
    fn load(&self) -> Vec<QueuedOperation>;

    /// Replaces the full snapshot.
    fn save(&self, operations: &[QueuedOperation]) -> SyncResult<()>;
}

// =============================================================================
// File Store
// =============================================================================

/// JSON file store with atomic replace.
#[derive(Debug, Clone)]
pub struct FileQueueStore {
    path: PathBuf,
}

impl FileQueueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileQueueStore { path: path.into() }
    }

    /// Store at `<dir>/offline_queue.json`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(QUEUE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| QUEUE_KEY.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl QueueStore for FileQueueStore {
    fn load(&self) -> Vec<QueuedOperation> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Offline queue unreadable, treating as empty");
                return Vec::new();
            }
        };

        if contents.trim().is_empty() {
            return Vec::new();
        }

        match serde_json::from_str::<Vec<QueuedOperation>>(&contents) {
            Ok(operations) => {
                debug!(count = operations.len(), "Offline queue loaded");
                operations
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Offline queue corrupt, treating as empty");
                Vec::new()
            }
        }
    }

    fn save(&self, operations: &[QueuedOperation]) -> SyncResult<()> {
        let bytes = serde_json::to_vec(operations)?;
        let write_failed = |e: std::io::Error| SyncError::StoreWriteFailed(format!("{}: {}", self.path.display(), e));

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(write_failed)?;
            }
        }

        let temp = self.temp_path();
        write_private(&temp, &bytes).map_err(write_failed)?;
        fs::rename(&temp, &self.path).map_err(write_failed)?;

        debug!(count = operations.len(), path = %self.path.display(), "Offline queue saved");
        Ok(())
    }
}

/// Writes `bytes` to `path` readable only by the owning user.
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    file.write_all(bytes)?;
    file.sync_all()
}

// =============================================================================
// Memory Store
// =============================================================================

/// In-process store for tests and sessions that need no persistence.
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    operations: Mutex<Vec<QueuedOperation>>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-filled with a snapshot.
    pub fn with_operations(operations: Vec<QueuedOperation>) -> Self {
        MemoryQueueStore {
            operations: Mutex::new(operations),
        }
    }
}

impl QueueStore for MemoryQueueStore {
    fn load(&self) -> Vec<QueuedOperation> {
        self.operations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn save(&self, operations: &[QueuedOperation]) -> SyncResult<()> {
        *self
            .operations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = operations.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duka_core::OperationKind;
    use serde_json::json;

    fn op(n: i64) -> QueuedOperation {
        QueuedOperation::new(OperationKind::Sale, json!({ "n": n }))
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileQueueStore::in_dir(dir.path());
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_save_then_load_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileQueueStore::in_dir(dir.path());
        let ops = vec![op(1), op(2), op(3)];

        store.save(&ops).unwrap();

        let reopened = FileQueueStore::in_dir(dir.path());
        assert_eq!(reopened.load(), ops);
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn test_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileQueueStore::in_dir(dir.path());
        fs::write(store.path(), "{ not json").unwrap();

        assert!(store.load().is_empty());

        // Still writable afterwards
        store.save(&[op(1)]).unwrap();
        assert_eq!(store.load().len(), 1);
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileQueueStore::new(dir.path().join("a").join("b").join(QUEUE_FILE));
        store.save(&[op(1)]).unwrap();
        assert_eq!(store.load().len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileQueueStore::in_dir(dir.path());
        store.save(&[op(1)]).unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryQueueStore::with_operations(vec![op(1)]);
        assert_eq!(store.load().len(), 1);
        store.save(&[]).unwrap();
        assert!(store.load().is_empty());
    }
}
