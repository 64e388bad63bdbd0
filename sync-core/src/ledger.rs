//! Local puff ledger.
//!
//! This module provides the ordered, append-only log of puffs recorded on
//! the device:
//! - Insertion ordering is preserved for every query
//! - Sync flags only move from unsynced to synced
//! - Old entries are pruned by a retention horizon, never individually
//!
//! The ledger is used by sync-client, which persists it after every
//! mutation. Puffs are appended, handed out as the unsynced suffix, and
//! marked synced once the server confirms them.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use thiserror::Error;

use pufftrack_sync_types::{PuffEvent, PuffId, TrackingMode};

/// Default retention horizon for puffs, in days.
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

/// Error type for ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The same id appears twice in a loaded ledger.
    #[error("duplicate puff id in ledger: {id}")]
    DuplicateId {
        /// The repeated id.
        id: PuffId,
    },
}

/// Ordered puff log with sync tracking.
///
/// Events flow through the ledger in this order:
/// 1. `append()` - record a new unsynced puff
/// 2. `unsynced_suffix()` - hand pending puffs to the reconciler
/// 3. `mark_synced()` - flip the flag for ids the server confirmed
///
/// `prune_older_than()` bounds storage; `reset()` clears everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PuffLedger {
    /// Events in insertion order.
    events: Vec<PuffEvent>,
}

impl PuffLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from persisted events, keeping their stored order.
    ///
    /// Returns an error if two events share an id.
    pub fn from_events(events: Vec<PuffEvent>) -> Result<Self, LedgerError> {
        let mut seen = HashSet::with_capacity(events.len());
        for event in &events {
            if !seen.insert(event.id) {
                return Err(LedgerError::DuplicateId { id: event.id });
            }
        }
        Ok(Self { events })
    }

    /// Record a new unsynced puff and return it.
    pub fn append(&mut self, timestamp: DateTime<Utc>, mode: TrackingMode) -> PuffEvent {
        let event = PuffEvent::new(timestamp, mode);
        self.events.push(event.clone());
        event
    }

    /// Remove every event with `timestamp < cutoff`.
    ///
    /// Returns the number of events removed. Survivors keep their order
    /// and sync flags.
    pub fn prune_older_than(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.events.len();
        self.events.retain(|e| e.timestamp >= cutoff);
        before - self.events.len()
    }

    /// All events the server has not acknowledged, in insertion order.
    pub fn unsynced_suffix(&self) -> Vec<PuffEvent> {
        self.events.iter().filter(|e| !e.synced).cloned().collect()
    }

    /// Mark exactly the given ids as synced.
    ///
    /// Unknown ids and already-synced events are ignored. Returns how many
    /// events changed state.
    pub fn mark_synced<'a, I>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = &'a PuffId>,
    {
        let ids: HashSet<&PuffId> = ids.into_iter().collect();
        if ids.is_empty() {
            return 0;
        }

        let mut changed = 0;
        for event in self.events.iter_mut() {
            if !event.synced && ids.contains(&event.id) {
                event.synced = true;
                changed += 1;
            }
        }
        changed
    }

    /// Events with `from <= timestamp < to`, in insertion order.
    pub fn range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<PuffEvent> {
        self.events
            .iter()
            .filter(|e| e.timestamp >= from && e.timestamp < to)
            .cloned()
            .collect()
    }

    /// Look up an event by id.
    pub fn get(&self, id: &PuffId) -> Option<&PuffEvent> {
        self.events.iter().find(|e| &e.id == id)
    }

    /// All events in insertion order.
    pub fn events(&self) -> &[PuffEvent] {
        &self.events
    }

    /// Total number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if the ledger is empty.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of events the server has acknowledged.
    pub fn synced_count(&self) -> usize {
        self.events.iter().filter(|e| e.synced).count()
    }

    /// Number of events still waiting for the server.
    pub fn unsynced_count(&self) -> usize {
        self.len() - self.synced_count()
    }

    /// Drop every event ("reset all data").
    pub fn reset(&mut self) {
        self.events.clear();
    }
}

/// Cutoff for a retention window ending at `now`.
pub fn retention_cutoff(now: DateTime<Utc>, retention_days: i64) -> DateTime<Utc> {
    now - Duration::days(retention_days)
}
