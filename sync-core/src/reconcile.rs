//! Delta computation for a reconciliation run.
//!
//! Given the ledger contents and the count the server reported, decide which
//! puffs go into the next `addPuffs` batch. Two strategies exist:
//!
//! - [`DeltaStrategy::Identifiers`] (default): the unsynced suffix is the
//!   delta. The server count is only compared against the local synced count
//!   and any disagreement is reported, never acted on. A server count above
//!   the local one is normal once old puffs have been pruned locally.
//! - [`DeltaStrategy::CountDifference`]: send the last `local - server`
//!   events regardless of their flags. Stops sending for good once the
//!   server holds more puffs than the device (after the first retention
//!   prune, or with puffs from other devices).
//!
//! Both are safe to re-drive: the server treats known ids as no-ops, and the
//! ledger only flips flags for ids the server confirms.

use pufftrack_sync_types::PuffEvent;

/// How the unsynced delta is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeltaStrategy {
    /// Every event whose `synced` flag is still false.
    #[default]
    Identifiers,
    /// The last `local_total - server_count` events.
    CountDifference,
}

/// Local and server counts disagree for reasons other than pending puffs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Discrepancy {
    /// What the device believes the server holds.
    pub expected: u64,
    /// What the server reported.
    pub reported: u64,
}

impl Discrepancy {
    /// The server reports fewer puffs than it has confirmed to this device.
    ///
    /// The opposite direction is expected after local pruning and is not a
    /// fault.
    pub fn server_lost_puffs(&self) -> bool {
        self.reported < self.expected
    }
}

/// Outcome of delta planning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaPlan {
    /// Events to emit, in ledger order.
    pub batch: Vec<PuffEvent>,
    /// Set when the counts do not line up.
    pub discrepancy: Option<Discrepancy>,
}

impl DeltaPlan {
    /// Nothing to send.
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }
}

/// Plan the next batch from the ledger contents and the server's count.
pub fn plan_delta(events: &[PuffEvent], server_count: u64, strategy: DeltaStrategy) -> DeltaPlan {
    match strategy {
        DeltaStrategy::Identifiers => {
            let batch: Vec<PuffEvent> = events.iter().filter(|e| !e.synced).cloned().collect();
            let expected = (events.len() - batch.len()) as u64;
            DeltaPlan {
                batch,
                discrepancy: (expected != server_count).then_some(Discrepancy {
                    expected,
                    reported: server_count,
                }),
            }
        }
        DeltaStrategy::CountDifference => {
            let local_total = events.len() as u64;
            let missing = local_total.saturating_sub(server_count) as usize;
            DeltaPlan {
                batch: events[events.len() - missing..].to_vec(),
                discrepancy: (server_count > local_total).then_some(Discrepancy {
                    expected: local_total,
                    reported: server_count,
                }),
            }
        }
    }
}
