//! # sync-core
//!
//! Pure logic for PuffTrack sync (no I/O, instant tests).
//!
//! This crate implements the state machines and algorithms for puff sync
//! without any network or disk I/O, enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects:
//! - [`ledger`] holds the ordered puff log and its sync flags
//! - [`state`] drives the session channel lifecycle
//! - [`auth`] classifies server errors
//! - [`reconcile`] decides which puffs go into the next batch
//! - [`stats`] computes the aggregates the UI displays
//!
//! The actual I/O (network, disk) is performed by `sync-client`, which
//! interprets the actions produced by these state machines.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod ledger;
pub mod reconcile;
pub mod state;
pub mod stats;

pub use auth::{classify_server_error, ErrorClass};
pub use ledger::{retention_cutoff, LedgerError, PuffLedger, DEFAULT_RETENTION_DAYS};
pub use reconcile::{plan_delta, DeltaPlan, DeltaStrategy, Discrepancy};
pub use state::{Action, ConnectionState, ConnectionStatus, Event, SessionEvent};
pub use stats::{
    Financials, GoalProgress, GoalStatus, Milestone, SpendingSettings, WeeklyComparison,
    WidgetSnapshot, WithdrawalStage, MILESTONES,
};
