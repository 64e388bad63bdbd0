//! SharedLedger - the persisted puff ledger shared between the app and the
//! reconciler.
//!
//! Every mutation is applied to a copy, written through the [`LedgerStore`],
//! and only then committed. A failed save leaves memory and disk in the same
//! state they were in before the call.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pufftrack_sync_core::{retention_cutoff, PuffLedger};
use pufftrack_sync_types::{PuffEvent, PuffId, TrackingMode};
use tokio::sync::Mutex;
use tracing::debug;

use crate::store::{LedgerStore, StoreError};

/// Persisted, mutex-guarded puff ledger.
pub struct SharedLedger {
    ledger: Mutex<PuffLedger>,
    store: Arc<dyn LedgerStore>,
    retention_days: i64,
}

impl SharedLedger {
    /// Load the ledger from `store`.
    pub async fn open(store: Arc<dyn LedgerStore>, retention_days: i64) -> Result<Self, StoreError> {
        let ledger = PuffLedger::from_events(store.load().await?)?;
        debug!(events = ledger.len(), unsynced = ledger.unsynced_count(), "ledger loaded");
        Ok(Self {
            ledger: Mutex::new(ledger),
            store,
            retention_days,
        })
    }

    /// Record a puff, prune expired entries, and persist.
    pub async fn append(
        &self,
        timestamp: DateTime<Utc>,
        mode: TrackingMode,
    ) -> Result<PuffEvent, StoreError> {
        let mut guard = self.ledger.lock().await;
        let mut next = guard.clone();
        let event = next.append(timestamp, mode);
        let pruned = next.prune_older_than(retention_cutoff(Utc::now(), self.retention_days));
        self.store.save(next.events()).await?;
        *guard = next;
        if pruned > 0 {
            debug!(pruned, "expired puffs pruned");
        }
        Ok(event)
    }

    /// Flip `synced` for `ids` and persist. Returns how many entries changed.
    pub async fn mark_synced(&self, ids: &[PuffId]) -> Result<usize, StoreError> {
        let mut guard = self.ledger.lock().await;
        let mut next = guard.clone();
        let changed = next.mark_synced(ids);
        if changed == 0 {
            return Ok(0);
        }
        self.store.save(next.events()).await?;
        *guard = next;
        Ok(changed)
    }

    /// Remove entries older than the retention horizon relative to `now`.
    pub async fn prune(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut guard = self.ledger.lock().await;
        let mut next = guard.clone();
        let pruned = next.prune_older_than(retention_cutoff(now, self.retention_days));
        if pruned == 0 {
            return Ok(0);
        }
        self.store.save(next.events()).await?;
        *guard = next;
        Ok(pruned)
    }

    /// Clear every puff ("reset all data") and persist.
    pub async fn reset(&self) -> Result<(), StoreError> {
        let mut guard = self.ledger.lock().await;
        self.store.save(&[]).await?;
        guard.reset();
        Ok(())
    }

    /// Unsynced events in insertion order.
    pub async fn unsynced_suffix(&self) -> Vec<PuffEvent> {
        self.ledger.lock().await.unsynced_suffix()
    }

    /// All events in insertion order.
    pub async fn events(&self) -> Vec<PuffEvent> {
        self.ledger.lock().await.events().to_vec()
    }

    /// Copy of the current ledger.
    pub async fn snapshot(&self) -> PuffLedger {
        self.ledger.lock().await.clone()
    }
}
