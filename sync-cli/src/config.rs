//! Configuration management for the pufftrack CLI.

use anyhow::{Context, Result};
use pufftrack_sync_client::{FileCredentialStore, JsonFileLedgerStore, SyncConfig};
use pufftrack_sync_core::{DeltaStrategy, SpendingSettings, DEFAULT_RETENTION_DAYS};
use pufftrack_sync_types::TrackingMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Config file looked up in the data directory when `--config` is absent.
pub const CONFIG_FILE: &str = "pufftrack.toml";
/// Persisted puff ledger.
pub const LEDGER_FILE: &str = "puffs.json";
/// Persisted session credential.
pub const CREDENTIAL_FILE: &str = "credential.json";

/// How the CLI picks the unsynced delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategySetting {
    /// Send every puff not yet confirmed by the server.
    #[default]
    Identifiers,
    /// Send the last `local - server` puffs.
    ///
    /// Stops sending anything once the server holds more puffs than the
    /// local ledger, which happens after the first retention prune or when
    /// another device logs puffs. Only useful against a fresh account.
    CountDifference,
}

impl From<StrategySetting> for DeltaStrategy {
    fn from(setting: StrategySetting) -> Self {
        match setting {
            StrategySetting::Identifiers => DeltaStrategy::Identifiers,
            StrategySetting::CountDifference => DeltaStrategy::CountDifference,
        }
    }
}

/// Settings read from `pufftrack.toml`. Every field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Sync server URL.
    pub server_url: String,
    /// Device name reported in logs.
    pub device_name: String,
    /// Seconds between background reconciliation runs.
    pub reconcile_interval_secs: u64,
    /// Seconds to wait for each server reply.
    pub round_trip_timeout_secs: u64,
    /// Days of puffs kept locally.
    pub retention_days: i64,
    /// Daily puff limit for the goal line; 0 disables it.
    pub daily_limit: u32,
    /// Price of one vape (or pack).
    pub vape_cost: f64,
    /// Puffs one vape lasts.
    pub puffs_per_vape: u32,
    /// Monthly spending before tracking.
    pub monthly_spending: f64,
    /// Mode recorded when `puff --mode` is not given.
    pub tracking_mode: String,
    /// Delta strategy.
    pub strategy: StrategySetting,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            server_url: "wss://api.pufftrack.app".to_string(),
            device_name: "pufftrack-cli".to_string(),
            reconcile_interval_secs: 10,
            round_trip_timeout_secs: 15,
            retention_days: DEFAULT_RETENTION_DAYS,
            daily_limit: 30,
            vape_cost: SpendingSettings::default().vape_cost,
            puffs_per_vape: SpendingSettings::default().puffs_per_vape,
            monthly_spending: SpendingSettings::default().monthly_spending,
            tracking_mode: TrackingMode::Vaping.to_string(),
            strategy: StrategySetting::default(),
        }
    }
}

impl CliConfig {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, `pufftrack.toml` in the
    /// data directory is read if present, otherwise defaults apply.
    pub async fn load(explicit: Option<&Path>, data_dir: &Path) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let path = data_dir.join(CONFIG_FILE);
                if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    return Ok(Self::default());
                }
                path
            }
        };

        let contents = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        if config.strategy == StrategySetting::CountDifference {
            warn!("count-difference strategy stops syncing once the server holds pruned puffs");
        }
        Ok(config)
    }

    /// Spending settings for the savings estimate.
    pub fn spending(&self) -> SpendingSettings {
        SpendingSettings {
            vape_cost: self.vape_cost,
            puffs_per_vape: self.puffs_per_vape,
            monthly_spending: self.monthly_spending,
        }
    }

    /// Default tracking mode for new puffs.
    pub fn default_mode(&self) -> Result<TrackingMode> {
        TrackingMode::from_str(&self.tracking_mode).context("Invalid tracking_mode in config")
    }

    /// Build the client configuration.
    pub fn to_sync_config(&self) -> SyncConfig {
        SyncConfig::new(&self.server_url)
            .with_device_name(&self.device_name)
            .with_reconcile_interval(Duration::from_secs(self.reconcile_interval_secs.max(1)))
            .with_round_trip_timeout(Duration::from_secs(self.round_trip_timeout_secs.max(1)))
            .with_retention_days(self.retention_days)
            .with_strategy(self.strategy.into())
            .with_daily_limit(self.daily_limit)
            .with_spending(self.spending())
    }
}

/// Ledger store inside the data directory.
pub fn ledger_store(data_dir: &Path) -> JsonFileLedgerStore {
    JsonFileLedgerStore::new(data_dir.join(LEDGER_FILE))
}

/// Credential store inside the data directory.
pub fn credential_store(data_dir: &Path) -> FileCredentialStore {
    FileCredentialStore::new(credential_path(data_dir))
}

/// Path of the credential file.
pub fn credential_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CREDENTIAL_FILE)
}

/// Set directory permissions to 0700 (owner only) on Unix.
/// No-op on non-Unix platforms.
pub async fn set_dir_permissions_0700(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .await
            .context("Failed to set directory permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_config_uses_defaults() {
        let dir = tempdir().unwrap();

        let config = CliConfig::load(None, dir.path()).await.unwrap();
        assert_eq!(config, CliConfig::default());
        assert_eq!(config.default_mode().unwrap(), TrackingMode::Vaping);
    }

    #[tokio::test]
    async fn partial_config_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        tokio::fs::write(
            dir.path().join(CONFIG_FILE),
            "server_url = \"ws://localhost:3000\"\nstrategy = \"count-difference\"\n",
        )
        .await
        .unwrap();

        let config = CliConfig::load(None, dir.path()).await.unwrap();
        assert_eq!(config.server_url, "ws://localhost:3000");
        assert_eq!(config.strategy, StrategySetting::CountDifference);
        assert_eq!(config.retention_days, DEFAULT_RETENTION_DAYS);

        let sync = config.to_sync_config();
        assert_eq!(sync.server_url, "ws://localhost:3000");
        assert_eq!(sync.strategy, DeltaStrategy::CountDifference);
        assert_eq!(sync.reconcile_interval, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn spending_settings_reach_sync_config() {
        let dir = tempdir().unwrap();
        tokio::fs::write(
            dir.path().join(CONFIG_FILE),
            "vape_cost = 12.5\npuffs_per_vape = 800\ndaily_limit = 0\n",
        )
        .await
        .unwrap();

        let config = CliConfig::load(None, dir.path()).await.unwrap();
        let sync = config.to_sync_config();
        assert_eq!(sync.daily_limit, 0);
        assert_eq!(sync.spending.vape_cost, 12.5);
        assert_eq!(sync.spending.puffs_per_vape, 800);
        assert_eq!(
            sync.spending.monthly_spending,
            SpendingSettings::default().monthly_spending
        );
    }

    #[tokio::test]
    async fn explicit_config_must_exist() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.toml");

        assert!(CliConfig::load(Some(&missing), dir.path()).await.is_err());
    }

    #[tokio::test]
    async fn invalid_config_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        tokio::fs::write(&path, "retention_days = \"many\"").await.unwrap();

        assert!(CliConfig::load(Some(&path), dir.path()).await.is_err());
    }

    #[test]
    fn unknown_tracking_mode_is_rejected() {
        let config = CliConfig {
            tracking_mode: "pipe".into(),
            ..CliConfig::default()
        };
        assert!(config.default_mode().is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn data_dir_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        set_dir_permissions_0700(dir.path()).await.unwrap();

        let mode = std::fs::metadata(dir.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }
}
