//! Named events exchanged over the session channel.
//!
//! Every frame is a JSON text message of the form
//! `{"event": "<name>", "data": <payload>}`; events without a payload omit
//! `data`.

use serde::{Deserialize, Serialize};

use crate::{FullSyncResponse, PuffEvent, PuffId, SyncError};

/// Events sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Submit a batch of pending puffs
    AddPuffs(AddPuffs),
    /// Ask for the server's authoritative puff count
    GetPuffCount,
    /// Send a friend request
    AddFriend(AddFriend),
    /// Accept a received friend request
    AcceptRequest(RequestRef),
    /// Decline a received friend request
    DeclineRequest(RequestRef),
}

impl ClientEvent {
    /// Wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddPuffs(_) => "addPuffs",
            Self::GetPuffCount => "getPuffCount",
            Self::AddFriend(_) => "addFriend",
            Self::AcceptRequest(_) => "acceptRequest",
            Self::DeclineRequest(_) => "declineRequest",
        }
    }

    /// Serialize to a JSON text frame.
    pub fn to_text(&self) -> Result<String, SyncError> {
        serde_json::to_string(self).map_err(SyncError::Serialization)
    }

    /// Deserialize from a JSON text frame.
    pub fn from_text(text: &str) -> Result<Self, SyncError> {
        serde_json::from_str(text).map_err(SyncError::Deserialization)
    }
}

/// Events pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Full account snapshot
    Update(UpdatePayload),
    /// Puffs the server has accepted
    SyncedPuffIds(SyncedPuffIds),
    /// Authoritative puff count for this account
    PuffCount(PuffCount),
    /// Free-text server error
    Error(ServerError),
}

impl ServerEvent {
    /// Wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Update(_) => "update",
            Self::SyncedPuffIds(_) => "syncedPuffIds",
            Self::PuffCount(_) => "puffCount",
            Self::Error(_) => "error",
        }
    }

    /// Serialize to a JSON text frame.
    pub fn to_text(&self) -> Result<String, SyncError> {
        serde_json::to_string(self).map_err(SyncError::Serialization)
    }

    /// Deserialize from a JSON text frame.
    pub fn from_text(text: &str) -> Result<Self, SyncError> {
        serde_json::from_str(text).map_err(SyncError::Deserialization)
    }
}

/// One pending puff on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PuffStamp {
    /// Client-assigned puff id
    pub id: PuffId,
    /// Unix time in seconds (fractional)
    pub timestamp: f64,
}

impl PuffStamp {
    /// Build the wire form of a ledger event.
    pub fn from_event(event: &PuffEvent) -> Self {
        Self {
            id: event.id,
            timestamp: event.timestamp.timestamp_millis() as f64 / 1000.0,
        }
    }
}

/// Payload of `addPuffs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddPuffs {
    /// Pending puffs, oldest first
    pub puffs: Vec<PuffStamp>,
}

impl AddPuffs {
    /// Build a batch from ledger events, preserving their order.
    pub fn from_events(events: &[PuffEvent]) -> Self {
        Self {
            puffs: events.iter().map(PuffStamp::from_event).collect(),
        }
    }

    /// Ids carried by this batch.
    pub fn ids(&self) -> Vec<PuffId> {
        self.puffs.iter().map(|p| p.id).collect()
    }
}

/// Payload of `addFriend`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddFriend {
    /// User id of the friend to add
    pub friend_id: String,
}

/// Payload of `acceptRequest` / `declineRequest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRef {
    /// Friend request id
    pub request_id: String,
}

/// Payload of `update`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePayload {
    /// The account snapshot
    pub sync: FullSyncResponse,
}

/// Payload of `syncedPuffIds`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncedPuffIds {
    /// Puffs the server accepted (new or already known)
    pub ids: Vec<PuffId>,
}

/// Payload of `puffCount`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PuffCount {
    /// Number of puffs the server holds for this account
    pub count: u64,
}

/// Payload of `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Human-readable message
    pub message: String,
    /// Structured error code, when the server provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}
