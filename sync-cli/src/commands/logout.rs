//! Forget the session credential.

use anyhow::{Context, Result};
use pufftrack_sync_client::CredentialStore;
use std::path::Path;

use crate::config;

/// Run the logout command. Local puffs are kept.
pub async fn run(data_dir: &Path) -> Result<()> {
    config::credential_store(data_dir)
        .delete()
        .await
        .context("Failed to delete credential")?;

    println!("Signed out. Local puffs were kept.");
    Ok(())
}
