//! Puff events as recorded on the device.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{PuffId, SyncError};

/// What kind of habit a puff was logged under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingMode {
    /// Vape puffs.
    #[default]
    Vaping,
    /// Individual cigarettes.
    Cigarettes,
}

impl TrackingMode {
    /// Singular unit name ("puff" / "cigarette").
    pub fn unit_name(&self) -> &'static str {
        match self {
            Self::Vaping => "puff",
            Self::Cigarettes => "cigarette",
        }
    }

    /// Plural unit name ("puffs" / "cigarettes").
    pub fn unit_name_plural(&self) -> &'static str {
        match self {
            Self::Vaping => "puffs",
            Self::Cigarettes => "cigarettes",
        }
    }
}

impl fmt::Display for TrackingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vaping => write!(f, "vaping"),
            Self::Cigarettes => write!(f, "cigarettes"),
        }
    }
}

impl FromStr for TrackingMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vaping" | "vape" => Ok(Self::Vaping),
            "cigarettes" | "cigarette" => Ok(Self::Cigarettes),
            other => Err(SyncError::InvalidData(format!(
                "unknown tracking mode: {other}"
            ))),
        }
    }
}

/// A single logged puff.
///
/// `id` never changes after creation. `synced` only ever moves from
/// `false` to `true`; the ledger is the only place that flips it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PuffEvent {
    /// Stable identifier shared with the server once synced.
    pub id: PuffId,
    /// When the puff happened (device clock).
    pub timestamp: DateTime<Utc>,
    /// Whether the server has acknowledged this puff.
    #[serde(default)]
    pub synced: bool,
    /// Habit the puff was logged under. Older ledgers lack this field.
    #[serde(default)]
    pub tracking_mode: TrackingMode,
}

impl PuffEvent {
    /// Create a new, unsynced puff with a fresh id.
    pub fn new(timestamp: DateTime<Utc>, tracking_mode: TrackingMode) -> Self {
        Self {
            id: PuffId::new(),
            timestamp,
            synced: false,
            tracking_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn new_puff_is_unsynced() {
        let puff = PuffEvent::new(Utc::now(), TrackingMode::Vaping);
        assert!(!puff.synced);
    }

    #[test]
    fn legacy_record_without_mode_defaults_to_vaping() {
        let json = r#"{
            "id": "6f1c2a1e-6f0b-4f5e-9d0e-2b1a7b9c3d44",
            "timestamp": "2024-09-23T10:00:00Z",
            "synced": true
        }"#;
        let puff: PuffEvent = serde_json::from_str(json).unwrap();
        assert_eq!(puff.tracking_mode, TrackingMode::Vaping);
        assert!(puff.synced);
        assert_eq!(
            puff.timestamp,
            Utc.with_ymd_and_hms(2024, 9, 23, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn tracking_mode_parses_loosely() {
        assert_eq!("Vaping".parse::<TrackingMode>().unwrap(), TrackingMode::Vaping);
        assert_eq!(
            "cigarette".parse::<TrackingMode>().unwrap(),
            TrackingMode::Cigarettes
        );
        assert!("pipe".parse::<TrackingMode>().is_err());
    }

    #[test]
    fn unit_names() {
        assert_eq!(TrackingMode::Vaping.unit_name_plural(), "puffs");
        assert_eq!(TrackingMode::Cigarettes.unit_name(), "cigarette");
    }
}
