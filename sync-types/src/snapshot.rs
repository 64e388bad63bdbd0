//! Account snapshot pushed by the server in `update` events.

use serde::{Deserialize, Serialize};

/// Full account state: profile, friends, and pending friend requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullSyncResponse {
    /// The signed-in user.
    pub user: User,
    /// Accepted friends with their puff summaries.
    #[serde(default)]
    pub friends: Vec<Friend>,
    /// Requests this user has sent.
    #[serde(default)]
    pub sent_friend_requests: Vec<FriendRequest>,
    /// Requests this user has received.
    #[serde(default)]
    pub received_friend_requests: Vec<FriendRequest>,
}

/// A user profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Server-assigned user id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
}

/// A friend and their puff summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Friend {
    /// Server-assigned user id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
    /// Server-computed statistics.
    #[serde(rename = "puffsummary")]
    pub puff_summary: PuffSummary,
}

/// Server-computed statistics for a friend.
///
/// The averages arrive pre-formatted as strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PuffSummary {
    /// Puffs logged today.
    pub puffs_today: u32,
    /// Average puffs per day, formatted.
    pub average_puffs_per_day: String,
    /// Change versus the previous period, formatted.
    pub change_percentage: String,
    /// Consecutive puff-free days.
    pub puffless_day_streak: u32,
}

/// A pending or resolved friend request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendRequest {
    /// Request id, used by `acceptRequest` / `declineRequest`.
    pub id: String,
    /// Server-side status string (e.g. "pending").
    pub status: String,
    /// Recipient, present on sent requests.
    #[serde(default)]
    pub receiver: Option<User>,
    /// Sender, present on received requests.
    #[serde(default)]
    pub sender: Option<User>,
}
