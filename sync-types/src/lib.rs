//! # sync-types
//!
//! Wire format types for the PuffTrack puff sync protocol.
//!
//! This crate provides the foundational types used across all pufftrack-sync crates:
//! - [`PuffId`], [`AuthToken`] - Identity and credential types
//! - [`PuffEvent`] - A single logged puff, as stored in the local ledger
//! - [`ClientEvent`], [`ServerEvent`] - Named events exchanged over the session channel
//! - [`FullSyncResponse`] - Account snapshot carried by the `update` event
//! - [`SyncError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod messages;
mod puff;
mod snapshot;

pub use error::SyncError;
pub use ids::{AuthToken, PuffId};
pub use messages::{
    AddFriend, AddPuffs, ClientEvent, PuffCount, PuffStamp, RequestRef, ServerError, ServerEvent,
    SyncedPuffIds, UpdatePayload,
};
pub use puff::{PuffEvent, TrackingMode};
pub use snapshot::{Friend, FriendRequest, FullSyncResponse, PuffSummary, User};
