//! Reconciler - pushes unsynced puffs and records server confirmations.
//!
//! A run is a single round trip pair over the session channel:
//!
//! ```text
//! getPuffCount → puffCount → plan_delta → addPuffs → syncedPuffIds → mark_synced
//! ```
//!
//! At most one run is active at a time; a trigger that arrives while a run
//! is in flight returns [`RunOutcome::Skipped`]. The in-flight flag is held by
//! an RAII guard, so every exit path (success, error, timeout, cancellation)
//! clears it. Nothing is carried between runs: each run recomputes the delta
//! from the ledger.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use pufftrack_sync_core::{plan_delta, DeltaStrategy, SessionEvent};
use pufftrack_sync_types::{AddPuffs, ClientEvent, PuffId, ServerEvent};
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::channel::{ChannelError, ChannelEvent, SessionChannel};
use crate::ledger::SharedLedger;
use crate::store::StoreError;
use crate::transport::Transport;

/// Reconciliation errors. Every one of them aborts the current run only.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The channel is not connected.
    #[error("not connected")]
    NotConnected,

    /// The server rejected the credential during the run.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The connection dropped during the run.
    #[error("disconnected: {0}")]
    Disconnected(String),

    /// The server answered with an error payload.
    #[error("server error: {0}")]
    Server(String),

    /// A reply did not arrive in time.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    /// Emission failed.
    #[error("channel error: {0}")]
    Channel(ChannelError),

    /// Confirmed ids could not be persisted.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl From<ChannelError> for ReconcileError {
    fn from(e: ChannelError) -> Self {
        match e {
            ChannelError::NotConnected => Self::NotConnected,
            other => Self::Channel(other),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Another run was already in flight.
    Skipped,
    /// Nothing needed sending.
    UpToDate,
    /// A batch was sent and (partly) confirmed.
    Synced {
        /// Puffs in the batch.
        sent: usize,
        /// Puffs from the batch the server confirmed.
        confirmed: usize,
    },
}

/// Reconciler timing and delta strategy.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Bound on each server reply.
    pub round_trip_timeout: Duration,
    /// Bound on the whole run.
    pub run_timeout: Duration,
    /// How the delta is computed.
    pub strategy: DeltaStrategy,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            round_trip_timeout: Duration::from_secs(15),
            run_timeout: Duration::from_secs(45),
            strategy: DeltaStrategy::default(),
        }
    }
}

/// Clears the in-flight flag when dropped.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The only component that marks puffs synced.
pub struct Reconciler<T: Transport> {
    channel: SessionChannel<T>,
    ledger: Arc<SharedLedger>,
    config: ReconcilerConfig,
    in_flight: Arc<AtomicBool>,
    trigger: Arc<Notify>,
}

impl<T: Transport> Clone for Reconciler<T> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel.clone(),
            ledger: Arc::clone(&self.ledger),
            config: self.config.clone(),
            in_flight: Arc::clone(&self.in_flight),
            trigger: Arc::clone(&self.trigger),
        }
    }
}

impl<T: Transport + 'static> Reconciler<T> {
    /// Create a reconciler over `channel` and `ledger`.
    pub fn new(channel: SessionChannel<T>, ledger: Arc<SharedLedger>, config: ReconcilerConfig) -> Self {
        Self {
            channel,
            ledger,
            config,
            in_flight: Arc::new(AtomicBool::new(false)),
            trigger: Arc::new(Notify::new()),
        }
    }

    /// Whether a run is currently in flight.
    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Ask the periodic task to run now.
    ///
    /// Dropped while a run is in flight; triggers never queue.
    pub fn trigger(&self) {
        if self.is_running() {
            debug!("trigger dropped, reconciliation in flight");
            return;
        }
        self.trigger.notify_one();
    }

    /// Run one reconciliation, unless one is already in flight.
    pub async fn run_once(&self) -> Result<RunOutcome, ReconcileError> {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            debug!("reconciliation already in flight, skipping");
            return Ok(RunOutcome::Skipped);
        };

        tokio::time::timeout(self.config.run_timeout, self.run_steps())
            .await
            .map_err(|_| ReconcileError::Timeout("run"))?
    }

    async fn run_steps(&self) -> Result<RunOutcome, ReconcileError> {
        // Subscribe before asking so the reply cannot be missed
        let mut rx = self.channel.subscribe();

        self.channel.try_emit(&ClientEvent::GetPuffCount).await?;
        let server_count = self
            .await_reply(&mut rx, "puffCount", |event| match event {
                ServerEvent::PuffCount(count) => Some(count.count),
                _ => None,
            })
            .await?;

        let events = self.ledger.events().await;
        let plan = plan_delta(&events, server_count, self.config.strategy);
        match plan.discrepancy {
            Some(d) if d.server_lost_puffs() => warn!(
                expected = d.expected,
                reported = d.reported,
                "server reports fewer puffs than it confirmed"
            ),
            Some(d) => debug!(
                expected = d.expected,
                reported = d.reported,
                "server holds puffs not in the local ledger"
            ),
            None => {}
        }
        if plan.is_empty() {
            debug!(server_count, "ledger up to date");
            return Ok(RunOutcome::UpToDate);
        }

        let batch = AddPuffs::from_events(&plan.batch);
        let batch_ids: HashSet<PuffId> = batch.ids().into_iter().collect();
        let sent = batch_ids.len();
        self.channel.try_emit(&ClientEvent::AddPuffs(batch)).await?;

        let confirmed = self
            .await_reply(&mut rx, "syncedPuffIds", |event| match event {
                ServerEvent::SyncedPuffIds(synced) => Some(synced.ids.clone()),
                _ => None,
            })
            .await?;

        let accepted: Vec<PuffId> = confirmed
            .into_iter()
            .filter(|id| batch_ids.contains(id))
            .collect();
        let changed = self.ledger.mark_synced(&accepted).await?;

        info!(sent, confirmed = accepted.len(), changed, "reconciliation complete");
        Ok(RunOutcome::Synced {
            sent,
            confirmed: accepted.len(),
        })
    }

    /// Wait for the first server event `pick` accepts.
    ///
    /// Aborts on auth failure, disconnect, or a server error payload.
    async fn await_reply<R, F>(
        &self,
        rx: &mut broadcast::Receiver<ChannelEvent>,
        step: &'static str,
        pick: F,
    ) -> Result<R, ReconcileError>
    where
        F: Fn(&ServerEvent) -> Option<R>,
    {
        let wait = async {
            loop {
                match rx.recv().await {
                    Ok(ChannelEvent::Server(event)) => {
                        if let Some(reply) = pick(&event) {
                            return Ok(reply);
                        }
                        if let ServerEvent::Error(error) = event {
                            return Err(ReconcileError::Server(error.message));
                        }
                    }
                    Ok(ChannelEvent::Session(SessionEvent::AuthFailed { reason })) => {
                        return Err(ReconcileError::AuthFailed(reason));
                    }
                    Ok(ChannelEvent::Session(SessionEvent::Disconnected { reason })) => {
                        return Err(ReconcileError::Disconnected(reason));
                    }
                    Ok(ChannelEvent::Session(_)) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "reconciler lagged behind channel events");
                    }
                    Err(RecvError::Closed) => {
                        return Err(ReconcileError::Disconnected("channel closed".into()));
                    }
                }
            }
        };

        tokio::time::timeout(self.config.round_trip_timeout, wait)
            .await
            .map_err(|_| ReconcileError::Timeout(step))?
    }

    /// Run on every tick of `period` and on every [`trigger`](Self::trigger).
    ///
    /// The first tick fires immediately. Ticks missed during a long run are
    /// skipped, not replayed.
    pub fn spawn_periodic(&self, period: Duration) -> JoinHandle<()> {
        let reconciler = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = reconciler.trigger.notified() => {}
                }
                match reconciler.run_once().await {
                    Ok(outcome) => debug!(?outcome, "reconciliation tick"),
                    Err(e) => debug!(error = %e, "reconciliation aborted"),
                }
                // Discard a trigger that slipped in between the wakeup and the run
                let _ = reconciler.trigger.notified().now_or_never();
            }
        })
    }
}
