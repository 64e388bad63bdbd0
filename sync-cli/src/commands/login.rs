//! Store a session credential.

use anyhow::{Context, Result};
use pufftrack_sync_client::CredentialStore;
use pufftrack_sync_types::AuthToken;
use std::path::Path;

use crate::config;

/// Run the login command.
///
/// The token is only stored here; it is presented on the next `sync`.
pub async fn run(data_dir: &Path, token: &str) -> Result<()> {
    let token = AuthToken::new(token.trim());
    if token.is_empty() {
        anyhow::bail!("Token must not be empty");
    }

    config::credential_store(data_dir)
        .save(&token)
        .await
        .context("Failed to save credential")?;

    println!("Credential saved to {}", config::credential_path(data_dir).display());
    println!("Run 'pufftrack sync' to connect.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn login_stores_token() {
        let dir = tempdir().unwrap();

        run(dir.path(), "  tok-123\n").await.unwrap();

        let stored = config::credential_store(dir.path()).load().await.unwrap();
        assert_eq!(stored, Some(AuthToken::new("tok-123")));
    }

    #[tokio::test]
    async fn blank_token_is_rejected() {
        let dir = tempdir().unwrap();

        assert!(run(dir.path(), "   ").await.is_err());
        assert!(!config::credential_path(dir.path()).exists());
    }
}
