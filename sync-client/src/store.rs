//! Ledger persistence.
//!
//! The ledger is written as a whole after every mutation. The file store
//! writes to a sibling temp file and renames it into place, so a crash
//! mid-write leaves the previous ledger intact.

use async_trait::async_trait;
use pufftrack_sync_core::LedgerError;
use pufftrack_sync_types::PuffEvent;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use thiserror::Error;

/// Persistence errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Stored data could not be encoded or decoded.
    #[error("invalid stored data: {0}")]
    Serde(#[from] serde_json::Error),

    /// Loaded events do not form a valid ledger.
    #[error("corrupt ledger: {0}")]
    Corrupt(#[from] LedgerError),

    /// The backing store refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Loads and saves the full puff ledger.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Load persisted events in stored order. A missing store is empty.
    async fn load(&self) -> Result<Vec<PuffEvent>, StoreError>;

    /// Replace the persisted events.
    async fn save(&self, events: &[PuffEvent]) -> Result<(), StoreError>;
}

/// In-memory ledger store for tests.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    events: Mutex<Vec<PuffEvent>>,
    fail_next_save: AtomicBool,
}

impl MemoryLedgerStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with events.
    pub fn with_events(events: Vec<PuffEvent>) -> Self {
        Self {
            events: Mutex::new(events),
            fail_next_save: AtomicBool::new(false),
        }
    }

    /// Cause the next save() to fail.
    pub fn fail_next_save(&self) {
        self.fail_next_save.store(true, Ordering::SeqCst);
    }

    /// Snapshot of what is currently persisted.
    pub fn saved(&self) -> Vec<PuffEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn load(&self) -> Result<Vec<PuffEvent>, StoreError> {
        Ok(self.saved())
    }

    async fn save(&self, events: &[PuffEvent]) -> Result<(), StoreError> {
        if self.fail_next_save.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("disk full".into()));
        }
        *self.events.lock().unwrap() = events.to_vec();
        Ok(())
    }
}

/// JSON file ledger store.
#[derive(Debug, Clone)]
pub struct JsonFileLedgerStore {
    path: PathBuf,
}

impl JsonFileLedgerStore {
    /// Store the ledger at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the ledger file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LedgerStore for JsonFileLedgerStore {
    async fn load(&self) -> Result<Vec<PuffEvent>, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(StoreError::io(&self.path, e)),
        }
    }

    async fn save(&self, events: &[PuffEvent]) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(events)?;
        write_private(&self.path, contents.as_bytes()).await
    }
}

/// Write `contents` to `path` atomically with owner-only permissions.
pub(crate) async fn write_private(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io(parent, e))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, contents)
        .await
        .map_err(|e| StoreError::io(&tmp, e))?;
    set_file_permissions_0600(&tmp).await?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StoreError::io(path, e))
}

/// Set file permissions to 0600 (owner read/write only) on Unix.
/// No-op on non-Unix platforms.
async fn set_file_permissions_0600(path: &Path) -> Result<(), StoreError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(|e| StoreError::io(path, e))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}
