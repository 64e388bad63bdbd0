//! CLI command implementations.

pub mod login;
pub mod logout;
pub mod puff;
pub mod reset;
pub mod status;
pub mod sync;

use anyhow::{Context, Result};
use pufftrack_sync_client::SharedLedger;
use std::path::Path;
use std::sync::Arc;

use crate::config::{self, CliConfig};

/// Open the on-disk ledger without touching the network.
pub(crate) async fn open_ledger(data_dir: &Path, config: &CliConfig) -> Result<SharedLedger> {
    SharedLedger::open(Arc::new(config::ledger_store(data_dir)), config.retention_days)
        .await
        .context("Failed to load puff ledger")
}
