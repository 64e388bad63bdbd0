//! Identity and credential types for pufftrack-sync.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::SyncError;

/// A unique identifier for a puff event.
///
/// UUID v4, assigned on the device when the puff is recorded and kept
/// unchanged once the server has accepted it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PuffId(uuid::Uuid);

impl PuffId {
    /// Create a new random PuffId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for PuffId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for PuffId {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| SyncError::InvalidData(format!("invalid puff id {s:?}: {e}")))
    }
}

impl fmt::Display for PuffId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for PuffId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PuffId({})", self.0)
    }
}

/// Opaque session credential issued by the server.
///
/// Sent once as a connection parameter; never logged.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthToken(String);

impl AuthToken {
    /// Wrap a token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Borrow the raw token for use on the wire.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the token is empty (and therefore unusable).
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthToken([{} chars REDACTED])", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn puff_id_is_uuid_v4() {
        let id = PuffId::new();
        assert_eq!(id.as_uuid().get_version_num(), 4);
    }

    #[test]
    fn puff_ids_are_unique() {
        assert_ne!(PuffId::new(), PuffId::new());
    }

    #[test]
    fn puff_id_parses_display_form() {
        let id = PuffId::new();
        let parsed: PuffId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn puff_id_rejects_garbage() {
        assert!("not-a-uuid".parse::<PuffId>().is_err());
    }

    #[test]
    fn puff_id_serializes_as_plain_string() {
        let id = PuffId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
    }

    #[test]
    fn auth_token_debug_redacts_value() {
        let token = AuthToken::new("s3cr3t-token");
        let debug = format!("{:?}", token);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("s3cr3t"), "token must not appear in Debug output");
    }

    #[test]
    fn blank_token_is_empty() {
        assert!(AuthToken::new("   ").is_empty());
        assert!(!AuthToken::new("abc").is_empty());
    }
}
