//! Delete all local puffs.

use anyhow::{Context, Result};
use std::path::Path;

use super::open_ledger;
use crate::config::CliConfig;

/// Run the reset command. Requires `--yes`.
pub async fn run(data_dir: &Path, config: &CliConfig, confirmed: bool) -> Result<()> {
    if !confirmed {
        anyhow::bail!("Refusing to delete local puffs without --yes");
    }

    let ledger = open_ledger(data_dir, config).await?;
    let count = ledger.events().await.len();
    ledger.reset().await.context("Failed to reset puff ledger")?;

    println!("Deleted {count} local puffs.");
    Ok(())
}
