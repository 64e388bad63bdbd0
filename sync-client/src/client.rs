//! PuffSync - the main interface for PuffTrack sync.
//!
//! This module provides [`PuffSync`], the API the app shell uses to record
//! puffs, manage the session, and keep the ledger reconciled with the server.
//!
//! # Architecture
//!
//! PuffSync wires together the persisted ledger, the session channel, and the
//! reconciler. Each is an explicitly constructed service; nothing is global.
//!
//! ```text
//! App → PuffSync → SharedLedger → LedgerStore
//!          ↓            ↑
//!      Reconciler ──────┘
//!          ↓
//!    SessionChannel → Transport → Server
//! ```
//!
//! # Example
//!
//! ```ignore
//! use pufftrack_sync_client::{PuffSync, SyncConfig, MockTransport};
//!
//! let config = SyncConfig::new("wss://api.pufftrack.app");
//! let sync = PuffSync::open(config, MockTransport::new(), credentials, ledger_store).await?;
//!
//! sync.login(token).await?;
//! sync.record_puff(Utc::now(), TrackingMode::Vaping).await?;
//! sync.sync_now().await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use pufftrack_sync_core::{
    stats, ConnectionStatus, DeltaStrategy, Financials, GoalProgress, Milestone,
    SpendingSettings, WeeklyComparison, WidgetSnapshot, WithdrawalStage, DEFAULT_RETENTION_DAYS,
};
use pufftrack_sync_types::{
    AddFriend, AuthToken, ClientEvent, FullSyncResponse, PuffEvent, RequestRef, TrackingMode,
};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

use crate::channel::{ChannelError, SessionChannel, SessionStatus};
use crate::credentials::CredentialStore;
use crate::ledger::SharedLedger;
use crate::reconciler::{ReconcileError, Reconciler, ReconcilerConfig, RunOutcome};
use crate::store::{LedgerStore, StoreError};
use crate::transport::Transport;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Channel error.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Reconciliation error.
    #[error("sync error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// Persistence error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

/// Configuration for PuffSync.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Sync server URL (`ws(s)://` or `http(s)://`).
    pub server_url: String,
    /// Human-readable device name, for logs.
    pub device_name: String,
    /// Period of the background reconciliation task.
    pub reconcile_interval: Duration,
    /// Bound on each server reply during a run.
    pub round_trip_timeout: Duration,
    /// How long puffs are kept locally, in days.
    pub retention_days: i64,
    /// How the unsynced delta is computed.
    pub strategy: DeltaStrategy,
    /// Daily puff limit for the widget and goal progress; 0 means none.
    pub daily_limit: u32,
    /// Spending settings for the savings estimate.
    pub spending: SpendingSettings,
}

impl SyncConfig {
    /// Create a configuration with defaults for `server_url`.
    pub fn new(server_url: &str) -> Self {
        Self {
            server_url: server_url.to_string(),
            device_name: "pufftrack device".to_string(),
            reconcile_interval: Duration::from_secs(10),
            round_trip_timeout: Duration::from_secs(15),
            retention_days: DEFAULT_RETENTION_DAYS,
            strategy: DeltaStrategy::default(),
            daily_limit: 0,
            spending: SpendingSettings::default(),
        }
    }

    /// Set the device name.
    pub fn with_device_name(mut self, name: &str) -> Self {
        self.device_name = name.to_string();
        self
    }

    /// Set the background reconciliation period.
    pub fn with_reconcile_interval(mut self, interval: Duration) -> Self {
        self.reconcile_interval = interval;
        self
    }

    /// Set the per-reply timeout.
    pub fn with_round_trip_timeout(mut self, timeout: Duration) -> Self {
        self.round_trip_timeout = timeout;
        self
    }

    /// Set the retention horizon in days.
    pub fn with_retention_days(mut self, days: i64) -> Self {
        self.retention_days = days;
        self
    }

    /// Set the delta strategy.
    pub fn with_strategy(mut self, strategy: DeltaStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the daily puff limit.
    pub fn with_daily_limit(mut self, limit: u32) -> Self {
        self.daily_limit = limit;
        self
    }

    /// Set the spending settings.
    pub fn with_spending(mut self, spending: SpendingSettings) -> Self {
        self.spending = spending;
        self
    }

    fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            round_trip_timeout: self.round_trip_timeout,
            // Two round trips plus slack for persistence
            run_timeout: self.round_trip_timeout * 3,
            strategy: self.strategy,
        }
    }
}

/// Aggregates for the home screen.
#[derive(Debug, Clone, PartialEq)]
pub struct PuffStats {
    /// Puffs logged today.
    pub today: usize,
    /// Whole days since the last puff.
    pub streak_days: i64,
    /// Average puffs per active day over the retention window.
    pub average_per_day: f64,
    /// Hours since the last puff, if any.
    pub hours_since_last_puff: Option<i64>,
    /// Withdrawal stage for the current gap.
    pub stage: WithdrawalStage,
    /// Puffs not yet confirmed by the server.
    pub unsynced: usize,
    /// Savings estimate at the current pace.
    pub financials: Financials,
    /// Last 7 days against the 7 before.
    pub weekly: WeeklyComparison,
    /// Today against the daily limit, if one is set.
    pub goal: Option<GoalProgress>,
    /// Milestones the current streak has reached.
    pub milestones_achieved: usize,
    /// The next milestone to reach, if any remain.
    pub next_milestone: Option<Milestone>,
}

impl PuffStats {
    /// Compute the aggregates at `now` with the limits and settings in `config`.
    pub fn compute<Tz: TimeZone>(events: &[PuffEvent], now: &DateTime<Tz>, config: &SyncConfig) -> Self {
        let hours = stats::hours_since_last_puff(events, now);
        let today = stats::puffs_today(events, now);
        let streak_days = stats::streak_days(events, now);
        Self {
            today,
            streak_days,
            average_per_day: stats::average_per_active_day(events, now, config.retention_days),
            hours_since_last_puff: hours,
            stage: WithdrawalStage::from_hours(hours),
            unsynced: events.iter().filter(|e| !e.synced).count(),
            financials: Financials::compute(events, now, config.retention_days, &config.spending),
            weekly: WeeklyComparison::compute(events, now),
            goal: GoalProgress::compute(today, config.daily_limit),
            milestones_achieved: stats::achieved_milestones(streak_days).count(),
            next_milestone: stats::next_milestone(streak_days).copied(),
        }
    }
}

/// The main sync client.
///
/// Owns the ledger, the session channel, and the reconciler.
pub struct PuffSync<T: Transport> {
    config: SyncConfig,
    channel: SessionChannel<T>,
    ledger: Arc<SharedLedger>,
    reconciler: Reconciler<T>,
    periodic: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl<T: Transport + 'static> PuffSync<T> {
    /// Load the ledger and build the client. Does not connect.
    pub async fn open(
        config: SyncConfig,
        transport: T,
        credentials: Arc<dyn CredentialStore>,
        ledger_store: Arc<dyn LedgerStore>,
    ) -> Result<Self, ClientError> {
        let ledger = Arc::new(SharedLedger::open(ledger_store, config.retention_days).await?);
        let channel = SessionChannel::new(transport, config.server_url.clone(), credentials);
        let reconciler = Reconciler::new(channel.clone(), ledger.clone(), config.reconciler_config());
        info!(device = %config.device_name, server = %config.server_url, "sync client opened");
        Ok(Self {
            config,
            channel,
            ledger,
            reconciler,
            periodic: std::sync::Mutex::new(None),
        })
    }

    /// Record a puff now-or-then and persist it.
    ///
    /// Wakes the background task if it is running.
    pub async fn record_puff(
        &self,
        timestamp: DateTime<Utc>,
        mode: TrackingMode,
    ) -> Result<PuffEvent, ClientError> {
        let event = self.ledger.append(timestamp, mode).await?;
        if self.periodic.lock().unwrap().is_some() {
            self.reconciler.trigger();
        }
        Ok(event)
    }

    /// Store `token` and connect.
    pub async fn login(&self, token: AuthToken) -> Result<ConnectionStatus, ClientError> {
        let status = self.channel.login(token).await?;
        self.check_auth(status)
    }

    /// Connect with the stored credential.
    pub async fn resume_session(&self) -> Result<ConnectionStatus, ClientError> {
        let status = self.channel.resume().await?;
        self.check_auth(status)
    }

    fn check_auth(&self, status: ConnectionStatus) -> Result<ConnectionStatus, ClientError> {
        if status == ConnectionStatus::AuthFailed {
            let reason = self
                .channel
                .last_error()
                .unwrap_or_else(|| "credential rejected".into());
            return Err(ChannelError::AuthFailed(reason).into());
        }
        Ok(status)
    }

    /// Delete the credential and disconnect. Local puffs are kept.
    pub async fn logout(&self) -> Result<(), ClientError> {
        self.stop();
        self.channel.logout().await?;
        Ok(())
    }

    /// Disconnect, keeping the credential.
    pub async fn disconnect(&self) {
        self.stop();
        self.channel.disconnect().await;
    }

    /// Run one reconciliation immediately.
    pub async fn sync_now(&self) -> Result<RunOutcome, ClientError> {
        Ok(self.reconciler.run_once().await?)
    }

    /// Start background reconciliation at the configured interval.
    pub fn start(&self) {
        let mut periodic = self.periodic.lock().unwrap();
        if periodic.is_none() {
            *periodic = Some(self.reconciler.spawn_periodic(self.config.reconcile_interval));
        }
    }

    /// Stop background reconciliation.
    pub fn stop(&self) {
        if let Some(handle) = self.periodic.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// Whether a reconciliation run is in flight.
    pub fn is_syncing(&self) -> bool {
        self.reconciler.is_running()
    }

    /// Connection status and last error for display.
    pub async fn session_status(&self) -> SessionStatus {
        self.channel.session_status().await
    }

    /// Most recent account snapshot pushed by the server.
    pub fn latest_snapshot(&self) -> Option<FullSyncResponse> {
        self.channel.latest_snapshot()
    }

    /// All puffs in insertion order.
    pub async fn puffs(&self) -> Vec<PuffEvent> {
        self.ledger.events().await
    }

    /// Puffs with `from <= timestamp < to`.
    pub async fn puffs_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<PuffEvent> {
        self.ledger.snapshot().await.range(from, to)
    }

    /// Home-screen aggregates at `now`.
    pub async fn stats<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> PuffStats {
        let events = self.ledger.events().await;
        PuffStats::compute(&events, now, &self.config)
    }

    /// Widget snapshot at `now`.
    pub async fn widget<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> WidgetSnapshot {
        let events = self.ledger.events().await;
        WidgetSnapshot::compute(&events, now, self.config.daily_limit)
    }

    /// Send a friend request. Dropped if not connected.
    pub async fn add_friend(&self, friend_id: &str) -> bool {
        self.channel
            .emit(&ClientEvent::AddFriend(AddFriend {
                friend_id: friend_id.to_string(),
            }))
            .await
    }

    /// Accept a friend request. Dropped if not connected.
    pub async fn accept_request(&self, request_id: &str) -> bool {
        self.channel
            .emit(&ClientEvent::AcceptRequest(RequestRef {
                request_id: request_id.to_string(),
            }))
            .await
    }

    /// Decline a friend request. Dropped if not connected.
    pub async fn decline_request(&self, request_id: &str) -> bool {
        self.channel
            .emit(&ClientEvent::DeclineRequest(RequestRef {
                request_id: request_id.to_string(),
            }))
            .await
    }

    /// Delete every local puff.
    pub async fn reset_all_data(&self) -> Result<(), ClientError> {
        self.ledger.reset().await?;
        info!("local puff data reset");
        Ok(())
    }

    /// The session channel.
    pub fn channel(&self) -> &SessionChannel<T> {
        &self.channel
    }

    /// The shared ledger.
    pub fn ledger(&self) -> &Arc<SharedLedger> {
        &self.ledger
    }
}

impl<T: Transport> Drop for PuffSync<T> {
    fn drop(&mut self) {
        if let Ok(mut periodic) = self.periodic.lock() {
            if let Some(handle) = periodic.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;
    use crate::store::MemoryLedgerStore;
    use crate::transport::MockTransport;
    use chrono::Duration as ChronoDuration;
    use pufftrack_sync_types::{PuffCount, ServerEvent, SyncedPuffIds};

    struct Fixture {
        transport: MockTransport,
        credentials: Arc<MemoryCredentialStore>,
        store: Arc<MemoryLedgerStore>,
        sync: PuffSync<MockTransport>,
    }

    /// Server double: counts nothing, accepts every batch.
    fn accept_all(transport: &MockTransport) {
        transport.respond_with(|event| match event {
            ClientEvent::GetPuffCount => vec![ServerEvent::PuffCount(PuffCount { count: 0 })],
            ClientEvent::AddPuffs(batch) => vec![ServerEvent::SyncedPuffIds(SyncedPuffIds {
                ids: batch.ids(),
            })],
            _ => vec![],
        });
    }

    async fn fixture() -> Fixture {
        let transport = MockTransport::new();
        accept_all(&transport);
        let credentials = Arc::new(MemoryCredentialStore::new());
        let store = Arc::new(MemoryLedgerStore::new());
        let sync = PuffSync::open(
            SyncConfig::new("ws://server").with_daily_limit(20),
            transport.clone(),
            credentials.clone(),
            store.clone(),
        )
        .await
        .unwrap();
        Fixture {
            transport,
            credentials,
            store,
            sync,
        }
    }

    // ===========================================
    // SyncConfig Tests
    // ===========================================

    #[test]
    fn config_defaults() {
        let config = SyncConfig::new("ws://server");
        assert_eq!(config.reconcile_interval, Duration::from_secs(10));
        assert_eq!(config.round_trip_timeout, Duration::from_secs(15));
        assert_eq!(config.retention_days, 30);
        assert_eq!(config.strategy, DeltaStrategy::Identifiers);
    }

    #[test]
    fn config_builders() {
        let config = SyncConfig::new("ws://server")
            .with_device_name("phone")
            .with_reconcile_interval(Duration::from_secs(60))
            .with_round_trip_timeout(Duration::from_secs(5))
            .with_retention_days(7)
            .with_strategy(DeltaStrategy::CountDifference);

        assert_eq!(config.device_name, "phone");
        assert_eq!(config.reconcile_interval, Duration::from_secs(60));
        assert_eq!(config.reconciler_config().run_timeout, Duration::from_secs(15));
        assert_eq!(config.retention_days, 7);
    }

    // ===========================================
    // Recording
    // ===========================================

    #[tokio::test]
    async fn record_puff_persists_unsynced() {
        let f = fixture().await;

        let event = f.sync.record_puff(Utc::now(), TrackingMode::Vaping).await.unwrap();

        assert!(!event.synced);
        assert_eq!(f.store.saved(), vec![event]);
    }

    #[tokio::test]
    async fn record_puff_surfaces_persistence_failure() {
        let f = fixture().await;
        f.store.fail_next_save();

        let result = f.sync.record_puff(Utc::now(), TrackingMode::Vaping).await;

        assert!(matches!(result, Err(ClientError::Store(_))));
        assert!(f.sync.puffs().await.is_empty());
    }

    #[tokio::test]
    async fn puffs_between_is_half_open() {
        let f = fixture().await;
        let now = Utc::now();
        let a = f.sync.record_puff(now - ChronoDuration::hours(2), TrackingMode::Vaping).await.unwrap();
        f.sync.record_puff(now, TrackingMode::Vaping).await.unwrap();

        let found = f.sync.puffs_between(now - ChronoDuration::hours(3), now).await;
        assert_eq!(found, vec![a]);
    }

    // ===========================================
    // Session
    // ===========================================

    #[tokio::test]
    async fn login_then_sync_marks_everything() {
        let f = fixture().await;
        for _ in 0..5 {
            f.sync.record_puff(Utc::now(), TrackingMode::Vaping).await.unwrap();
        }

        f.sync.login(AuthToken::new("tok")).await.unwrap();
        let outcome = f.sync.sync_now().await.unwrap();

        assert_eq!(outcome, RunOutcome::Synced { sent: 5, confirmed: 5 });
        assert!(f.sync.puffs().await.iter().all(|e| e.synced));
        assert!(f.credentials.has_token());
        assert_eq!(
            f.sync.session_status().await.status,
            ConnectionStatus::Connected
        );
    }

    #[tokio::test]
    async fn rejected_login_reports_auth_failure() {
        let f = fixture().await;
        f.transport.fail_next_connect_unauthorized();

        let result = f.sync.login(AuthToken::new("bad")).await;

        assert!(matches!(
            result,
            Err(ClientError::Channel(ChannelError::AuthFailed(_)))
        ));
        assert!(!f.credentials.has_token());
        assert_eq!(
            f.sync.session_status().await.status,
            ConnectionStatus::AuthFailed
        );
    }

    #[tokio::test]
    async fn resume_without_login_fails() {
        let f = fixture().await;
        let result = f.sync.resume_session().await;
        assert!(matches!(
            result,
            Err(ClientError::Channel(ChannelError::NoCredential))
        ));
    }

    #[tokio::test]
    async fn logout_keeps_local_puffs() {
        let f = fixture().await;
        f.sync.login(AuthToken::new("tok")).await.unwrap();
        f.sync.record_puff(Utc::now(), TrackingMode::Vaping).await.unwrap();

        f.sync.logout().await.unwrap();

        assert!(!f.credentials.has_token());
        assert_eq!(f.sync.puffs().await.len(), 1);
        assert!(matches!(
            f.sync.sync_now().await,
            Err(ClientError::Reconcile(ReconcileError::NotConnected))
        ));
    }

    #[tokio::test]
    async fn reset_all_data_clears_ledger() {
        let f = fixture().await;
        f.sync.record_puff(Utc::now(), TrackingMode::Cigarettes).await.unwrap();

        f.sync.reset_all_data().await.unwrap();

        assert!(f.sync.puffs().await.is_empty());
        assert!(f.store.saved().is_empty());
    }

    // ===========================================
    // Friend Commands
    // ===========================================

    #[tokio::test]
    async fn friend_commands_emit_when_connected() {
        let f = fixture().await;
        assert!(!f.sync.add_friend("u2").await);

        f.sync.login(AuthToken::new("tok")).await.unwrap();
        assert!(f.sync.add_friend("u2").await);
        assert!(f.sync.accept_request("r1").await);
        assert!(f.sync.decline_request("r2").await);

        let names: Vec<&str> = f.transport.sent_events().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["addFriend", "acceptRequest", "declineRequest"]);
    }

    // ===========================================
    // Aggregates
    // ===========================================

    #[tokio::test]
    async fn stats_and_widget_reflect_ledger() {
        let f = fixture().await;
        let now = Utc::now();
        f.sync.record_puff(now - ChronoDuration::hours(5), TrackingMode::Vaping).await.unwrap();

        let stats = f.sync.stats(&now).await;
        assert_eq!(stats.hours_since_last_puff, Some(5));
        assert_eq!(stats.stage, WithdrawalStage::Early);
        assert_eq!(stats.unsynced, 1);

        let widget = f.sync.widget(&now).await;
        assert_eq!(widget.daily_limit, 20);
        assert_eq!(widget.hours_since_last_puff, 5);
    }

    #[test]
    fn stats_carry_goal_milestones_and_savings() {
        use pufftrack_sync_core::GoalStatus;

        let now = Utc::now();
        let config = SyncConfig::new("ws://server")
            .with_daily_limit(4)
            .with_spending(SpendingSettings {
                vape_cost: 20.0,
                puffs_per_vape: 100,
                monthly_spending: 60.0,
            });

        // Last puff 8 days ago: streak 8, goal untouched today
        let old: Vec<PuffEvent> = (0..10)
            .map(|_| PuffEvent::new(now - ChronoDuration::days(8), TrackingMode::Vaping))
            .collect();
        let stats = PuffStats::compute(&old, &now, &config);
        assert_eq!(stats.streak_days, 8);
        assert_eq!(stats.milestones_achieved, 3);
        assert_eq!(stats.next_milestone.map(|m| m.days), Some(14));
        assert_eq!(stats.goal.map(|g| g.status), Some(GoalStatus::OnTrack));
        assert_eq!(stats.weekly.this_week, 0);
        assert_eq!(stats.weekly.last_week, 10);
        // 10 puffs/day at 0.2 per puff = 2.0 per day against 2.0 before
        assert!(stats.financials.money_saved.abs() < 1e-9);

        let today: Vec<PuffEvent> = (0..4)
            .map(|_| PuffEvent::new(now, TrackingMode::Vaping))
            .collect();
        let stats = PuffStats::compute(&today, &now, &config);
        assert_eq!(stats.goal.map(|g| g.status), Some(GoalStatus::OverLimit));
        assert_eq!(stats.milestones_achieved, 0);
    }

    // ===========================================
    // Background Reconciliation
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn background_task_syncs_recorded_puffs() {
        let f = fixture().await;
        f.sync.login(AuthToken::new("tok")).await.unwrap();
        f.sync.start();
        tokio::time::sleep(Duration::from_millis(50)).await;

        f.sync.record_puff(Utc::now(), TrackingMode::Vaping).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(f.sync.puffs().await.iter().all(|e| e.synced));
        f.sync.stop();
    }
}
