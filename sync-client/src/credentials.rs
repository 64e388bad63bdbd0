//! Credential storage.
//!
//! The session channel is the only owner of the credential: it loads it
//! when resuming, and deletes it when the server rejects it.

use async_trait::async_trait;
use pufftrack_sync_types::AuthToken;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::store::{write_private, StoreError};

/// Secure storage for the session credential.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Persist the credential, replacing any previous one.
    async fn save(&self, token: &AuthToken) -> Result<(), StoreError>;

    /// Load the credential, if one is stored.
    async fn load(&self) -> Result<Option<AuthToken>, StoreError>;

    /// Remove the credential. Deleting a missing credential succeeds.
    async fn delete(&self) -> Result<(), StoreError>;
}

/// In-memory credential store for tests.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    token: Mutex<Option<AuthToken>>,
    deletes: AtomicUsize,
}

impl MemoryCredentialStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `token`.
    pub fn with_token(token: AuthToken) -> Self {
        Self {
            token: Mutex::new(Some(token)),
            deletes: AtomicUsize::new(0),
        }
    }

    /// How many times delete() was called.
    pub fn delete_calls(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Whether a credential is currently stored.
    pub fn has_token(&self) -> bool {
        self.token.lock().unwrap().is_some()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn save(&self, token: &AuthToken) -> Result<(), StoreError> {
        *self.token.lock().unwrap() = Some(token.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<AuthToken>, StoreError> {
        Ok(self.token.lock().unwrap().clone())
    }

    async fn delete(&self) -> Result<(), StoreError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.token.lock().unwrap().take();
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct StoredCredential {
    token: AuthToken,
}

/// Credential stored in an owner-only (0600) JSON file.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Store the credential at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the credential file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn save(&self, token: &AuthToken) -> Result<(), StoreError> {
        let contents = serde_json::to_string(&StoredCredential {
            token: token.clone(),
        })?;
        write_private(&self.path, contents.as_bytes()).await
    }

    async fn load(&self) -> Result<Option<AuthToken>, StoreError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let stored: StoredCredential = serde_json::from_str(&contents)?;
        Ok((!stored.token.is_empty()).then_some(stored.token))
    }

    async fn delete(&self) -> Result<(), StoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn memory_store_tracks_deletes() {
        let store = MemoryCredentialStore::with_token(AuthToken::new("t"));
        assert!(store.has_token());

        store.delete().await.unwrap();
        store.delete().await.unwrap();

        assert!(!store.has_token());
        assert_eq!(store.delete_calls(), 2);
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_round_trip_and_delete() {
        let dir = tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("credential.json"));

        assert!(store.load().await.unwrap().is_none());

        store.save(&AuthToken::new("secret-token")).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.expose(), "secret-token");

        store.delete().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
        // Deleting again is fine
        store.delete().await.unwrap();
    }

    #[tokio::test]
    async fn file_store_treats_blank_token_as_absent() {
        let dir = tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("credential.json"));
        store.save(&AuthToken::new("   ")).await.unwrap();

        assert!(store.load().await.unwrap().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("credential.json"));
        store.save(&AuthToken::new("t")).await.unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
