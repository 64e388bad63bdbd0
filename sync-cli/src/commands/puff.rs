//! Record a puff.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use pufftrack_sync_types::TrackingMode;
use std::path::Path;
use std::str::FromStr;

use super::open_ledger;
use crate::config::CliConfig;

/// Run the puff command.
///
/// `at` is an RFC 3339 timestamp; the current time is used when absent.
pub async fn run(
    data_dir: &Path,
    config: &CliConfig,
    at: Option<&str>,
    mode: Option<&str>,
) -> Result<()> {
    let timestamp = match at {
        Some(raw) => parse_timestamp(raw)?,
        None => Utc::now(),
    };
    let mode = match mode {
        Some(raw) => TrackingMode::from_str(raw).context("Invalid --mode")?,
        None => config.default_mode()?,
    };

    let ledger = open_ledger(data_dir, config).await?;
    let event = ledger
        .append(timestamp, mode)
        .await
        .context("Failed to record puff")?;

    println!("Recorded {} puff at {}", event.tracking_mode, event.timestamp.to_rfc3339());
    println!("  ID: {}", event.id);
    println!("  Pending sync: {}", ledger.unsynced_suffix().await.len());
    Ok(())
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid --at timestamp '{raw}', expected RFC 3339"))?;
    Ok(parsed.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::open_ledger;
    use tempfile::tempdir;

    #[tokio::test]
    async fn puff_is_persisted_unsynced() {
        let dir = tempdir().unwrap();
        let config = CliConfig::default();

        run(dir.path(), &config, None, None).await.unwrap();
        run(dir.path(), &config, None, Some("cigarettes")).await.unwrap();

        let events = open_ledger(dir.path(), &config).await.unwrap().events().await;
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| !e.synced));
        assert_eq!(events[0].tracking_mode, TrackingMode::Vaping);
        assert_eq!(events[1].tracking_mode, TrackingMode::Cigarettes);
    }

    #[tokio::test]
    async fn explicit_timestamp_is_used() {
        let dir = tempdir().unwrap();
        let config = CliConfig::default();
        let at = (Utc::now() - chrono::Duration::hours(2)).to_rfc3339();

        run(dir.path(), &config, Some(&at), None).await.unwrap();

        let events = open_ledger(dir.path(), &config).await.unwrap().events().await;
        assert_eq!(events[0].timestamp, parse_timestamp(&at).unwrap());
    }

    #[tokio::test]
    async fn bad_input_is_rejected() {
        let dir = tempdir().unwrap();
        let config = CliConfig::default();

        assert!(run(dir.path(), &config, Some("yesterday"), None).await.is_err());
        assert!(run(dir.path(), &config, None, Some("pipe")).await.is_err());

        let events = open_ledger(dir.path(), &config).await.unwrap().events().await;
        assert!(events.is_empty());
    }

    #[test]
    fn offsets_are_normalized_to_utc() {
        let ts = parse_timestamp("2024-03-01T10:00:00+02:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-01T08:00:00+00:00");
    }
}
