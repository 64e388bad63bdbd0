//! SessionChannel - the authenticated event connection.
//!
//! The channel owns the credential and the transport. Lifecycle decisions
//! come from the pure [`ConnectionState`] machine in sync-core; this module
//! executes the resulting actions and dispatches inbound frames.
//!
//! ```text
//! connect(token) → Event::ConnectRequested → [Action::Connect] → Transport
//!                                                        ↓
//!           reader task → ServerEvent → broadcast → subscribers
//! ```
//!
//! Emission is fire-and-forget: outside `Connected` it is dropped and logged,
//! never queued. Durability belongs to the reconciler.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pufftrack_sync_core::{
    classify_server_error, Action, ConnectionState, ConnectionStatus, ErrorClass, Event,
    SessionEvent,
};
use pufftrack_sync_types::{AuthToken, ClientEvent, FullSyncResponse, ServerEvent, SyncError};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::credentials::CredentialStore;
use crate::store::StoreError;
use crate::transport::{Transport, TransportError};

const EVENT_CAPACITY: usize = 64;

type BoxTask = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Channel errors.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Emission attempted outside the connected state.
    #[error("not connected")]
    NotConnected,

    /// No credential is available to resume a session.
    #[error("no stored credential")]
    NoCredential,

    /// The server rejected the credential.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Outbound event could not be encoded.
    #[error("encoding error: {0}")]
    Encode(#[from] SyncError),

    /// Credential store error.
    #[error("credential store error: {0}")]
    Credential(#[from] StoreError),
}

/// Everything the channel publishes to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// A decoded inbound server event.
    Server(ServerEvent),
    /// A lifecycle change.
    Session(SessionEvent),
}

/// Status plus the last displayable error, for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    /// Coarse connection status.
    pub status: ConnectionStatus,
    /// Most recent connection or server error message.
    pub last_error: Option<String>,
}

/// One authenticated, long-lived connection to the sync server.
pub struct SessionChannel<T: Transport> {
    inner: Arc<ChannelInner<T>>,
}

impl<T: Transport> Clone for SessionChannel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct ChannelInner<T> {
    transport: T,
    url: String,
    credentials: Arc<dyn CredentialStore>,
    state: Mutex<ConnectionState>,
    token: std::sync::Mutex<Option<AuthToken>>,
    events: broadcast::Sender<ChannelEvent>,
    last_error: std::sync::Mutex<Option<String>>,
    snapshot: std::sync::Mutex<Option<FullSyncResponse>>,
    /// Bumped on every connect and disconnect; stale readers exit.
    read_generation: AtomicU64,
    /// Bumped on cancel; stale reconnect timers do nothing.
    reconnect_epoch: AtomicU64,
}

impl<T: Transport + 'static> SessionChannel<T> {
    /// Create a disconnected channel for the server at `url`.
    pub fn new(transport: T, url: impl Into<String>, credentials: Arc<dyn CredentialStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(ChannelInner {
                transport,
                url: url.into(),
                credentials,
                state: Mutex::new(ConnectionState::new()),
                token: std::sync::Mutex::new(None),
                events,
                last_error: std::sync::Mutex::new(None),
                snapshot: std::sync::Mutex::new(None),
                read_generation: AtomicU64::new(0),
                reconnect_epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Begin a connection with `token`.
    ///
    /// No-op if already connecting or connected. Returns the status once the
    /// first attempt has resolved.
    pub async fn connect(&self, token: AuthToken) -> ConnectionStatus {
        {
            let state = self.inner.state.lock().await;
            if state.is_connected() || state.is_connecting() {
                debug!("connect ignored, session already active");
                return state.status();
            }
        }
        *self.inner.token.lock().unwrap() = Some(token);
        self.drive(Event::ConnectRequested).await;
        self.status().await
    }

    /// Store `token` and connect with it.
    pub async fn login(&self, token: AuthToken) -> Result<ConnectionStatus, ChannelError> {
        self.inner.credentials.save(&token).await?;
        Ok(self.connect(token).await)
    }

    /// Connect with the stored credential.
    ///
    /// A credential that fails to load counts as absent.
    pub async fn resume(&self) -> Result<ConnectionStatus, ChannelError> {
        let token = match self.inner.credentials.load().await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "failed to load credential, treating as signed out");
                None
            }
        };
        match token {
            Some(token) if !token.is_empty() => Ok(self.connect(token).await),
            _ => Err(ChannelError::NoCredential),
        }
    }

    /// Close the connection and stop reconnecting. The credential is kept.
    pub async fn disconnect(&self) {
        self.drive(Event::DisconnectRequested).await;
    }

    /// Disconnect and delete the credential.
    pub async fn logout(&self) -> Result<(), ChannelError> {
        self.drive(Event::DisconnectRequested).await;
        self.inner.token.lock().unwrap().take();
        self.inner.credentials.delete().await?;
        info!("logged out");
        Ok(())
    }

    /// Send `event`, failing if not connected.
    pub async fn try_emit(&self, event: &ClientEvent) -> Result<(), ChannelError> {
        if !self.inner.state.lock().await.is_connected() {
            return Err(ChannelError::NotConnected);
        }
        let frame = event.to_text()?;
        self.inner.transport.send(&frame).await?;
        debug!(event = event.name(), "emitted");
        Ok(())
    }

    /// Fire-and-forget send. Returns whether the frame went out.
    pub async fn emit(&self, event: &ClientEvent) -> bool {
        match self.try_emit(event).await {
            Ok(()) => true,
            Err(e) => {
                debug!(event = event.name(), error = %e, "emission dropped");
                false
            }
        }
    }

    /// Subscribe to inbound server events and lifecycle changes.
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.inner.events.subscribe()
    }

    /// Current coarse status.
    pub async fn status(&self) -> ConnectionStatus {
        self.inner.state.lock().await.status()
    }

    /// Full connection state.
    pub async fn state(&self) -> ConnectionState {
        self.inner.state.lock().await.clone()
    }

    /// Status and last error for display.
    pub async fn session_status(&self) -> SessionStatus {
        SessionStatus {
            status: self.status().await,
            last_error: self.last_error(),
        }
    }

    /// Most recent connection or server error message.
    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.lock().unwrap().clone()
    }

    /// Most recent `update` snapshot from the server.
    pub fn latest_snapshot(&self) -> Option<FullSyncResponse> {
        self.inner.snapshot.lock().unwrap().clone()
    }

    /// Feed `first` through the state machine and execute the resulting
    /// actions until no follow-up events remain.
    async fn drive(&self, first: Event) {
        let mut pending = VecDeque::from([first]);
        while let Some(event) = pending.pop_front() {
            let actions = {
                let mut state = self.inner.state.lock().await;
                let (next, actions) = std::mem::take(&mut *state).on_event(event);
                *state = next;
                actions
            };
            for action in actions {
                if let Some(follow_up) = self.execute(action).await {
                    pending.push_back(follow_up);
                }
            }
        }
    }

    async fn execute(&self, action: Action) -> Option<Event> {
        match action {
            Action::Connect => Some(self.open().await),
            Action::Disconnect => {
                self.inner.read_generation.fetch_add(1, Ordering::SeqCst);
                if let Err(e) = self.inner.transport.close().await {
                    debug!(error = %e, "close failed");
                }
                None
            }
            Action::StartReconnectTimer { delay } => {
                self.schedule_reconnect(delay);
                None
            }
            Action::CancelReconnect => {
                self.inner.reconnect_epoch.fetch_add(1, Ordering::SeqCst);
                None
            }
            Action::ClearCredential => {
                self.inner.token.lock().unwrap().take();
                if let Err(e) = self.inner.credentials.delete().await {
                    warn!(error = %e, "failed to delete rejected credential");
                }
                None
            }
            Action::EmitEvent(event) => {
                self.report(&event);
                let _ = self.inner.events.send(ChannelEvent::Session(event));
                None
            }
        }
    }

    /// Open the transport; the result becomes the next state machine event.
    async fn open(&self) -> Event {
        let token = self.inner.token.lock().unwrap().clone();
        let Some(token) = token else {
            return Event::AuthRejected {
                reason: "no credential".into(),
            };
        };

        let generation = self.inner.read_generation.fetch_add(1, Ordering::SeqCst) + 1;
        match self.inner.transport.connect(&self.inner.url, &token).await {
            Ok(()) => {
                self.spawn_reader(generation);
                Event::ConnectSucceeded
            }
            Err(TransportError::Unauthorized(reason)) => Event::AuthRejected { reason },
            Err(e) => Event::ConnectFailed {
                error: e.to_string(),
            },
        }
    }

    fn report(&self, event: &SessionEvent) {
        let mut last_error = self.inner.last_error.lock().unwrap();
        match event {
            SessionEvent::Connected => {
                info!(url = %self.inner.url, "connected");
                *last_error = None;
            }
            SessionEvent::ConnectionFailed { error } => {
                info!(error = %error, "connection failed, will retry");
                *last_error = Some(error.clone());
            }
            SessionEvent::ReconnectFailed { attempt, error } => {
                info!(attempt, error = %error, "reconnect failed");
                *last_error = Some(error.clone());
            }
            SessionEvent::Disconnected { reason } => {
                info!(reason = %reason, "disconnected");
            }
            SessionEvent::AuthFailed { reason } => {
                warn!(reason = %reason, "credential rejected, session ended");
                *last_error = Some(reason.clone());
            }
        }
    }

    fn schedule_reconnect(&self, delay: Duration) {
        let channel = self.clone();
        let epoch = self.inner.reconnect_epoch.load(Ordering::SeqCst);
        debug!(delay_ms = delay.as_millis() as u64, "reconnect scheduled");
        let task: BoxTask = Box::pin(async move {
            tokio::time::sleep(delay).await;
            if channel.inner.reconnect_epoch.load(Ordering::SeqCst) == epoch {
                channel.drive(Event::ReconnectTimer).await;
            }
        });
        tokio::spawn(task);
    }

    fn spawn_reader(&self, generation: u64) {
        let channel = self.clone();
        let task: BoxTask = Box::pin(async move { channel.read_loop(generation).await });
        tokio::spawn(task);
    }

    async fn read_loop(&self, generation: u64) {
        loop {
            let result = self.inner.transport.recv().await;
            if self.inner.read_generation.load(Ordering::SeqCst) != generation {
                return;
            }
            match result {
                Ok(frame) => self.dispatch(&frame).await,
                Err(e) => {
                    self.drive(Event::Disconnected {
                        reason: e.to_string(),
                    })
                    .await;
                    return;
                }
            }
        }
    }

    async fn dispatch(&self, frame: &str) {
        let event = match ServerEvent::from_text(frame) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "ignoring undecodable frame");
                return;
            }
        };
        debug!(event = event.name(), "received");

        match &event {
            ServerEvent::Update(payload) => {
                *self.inner.snapshot.lock().unwrap() = Some(payload.sync.clone());
            }
            ServerEvent::Error(error) => {
                *self.inner.last_error.lock().unwrap() = Some(error.message.clone());
                // Logout completes before subscribers see the raw error
                if classify_server_error(&error.message, error.code.as_deref())
                    == ErrorClass::AuthFailure
                {
                    self.drive(Event::AuthRejected {
                        reason: error.message.clone(),
                    })
                    .await;
                } else {
                    warn!(message = %error.message, "server error");
                }
            }
            ServerEvent::SyncedPuffIds(_) | ServerEvent::PuffCount(_) => {}
        }

        let _ = self.inner.events.send(ChannelEvent::Server(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;
    use crate::transport::MockTransport;
    use pufftrack_sync_types::{PuffCount, ServerError, UpdatePayload, User};

    struct Fixture {
        transport: MockTransport,
        credentials: Arc<MemoryCredentialStore>,
        channel: SessionChannel<MockTransport>,
    }

    fn fixture() -> Fixture {
        let transport = MockTransport::new();
        let credentials = Arc::new(MemoryCredentialStore::with_token(AuthToken::new("tok")));
        let channel = SessionChannel::new(transport.clone(), "ws://server", credentials.clone());
        Fixture {
            transport,
            credentials,
            channel,
        }
    }

    async fn next_event(rx: &mut broadcast::Receiver<ChannelEvent>) -> ChannelEvent {
        tokio::time::timeout(Duration::from_secs(30), rx.recv())
            .await
            .expect("timed out waiting for channel event")
            .expect("channel closed")
    }

    fn server_error(message: &str, code: Option<&str>) -> ServerEvent {
        ServerEvent::Error(ServerError {
            message: message.into(),
            code: code.map(String::from),
        })
    }

    // ===========================================
    // Connection Lifecycle
    // ===========================================

    #[test]
    fn channel_events_compare_by_value() {
        let count = ChannelEvent::Server(ServerEvent::PuffCount(PuffCount { count: 3 }));
        assert_eq!(count.clone(), count);
        assert_ne!(
            count,
            ChannelEvent::Server(ServerEvent::PuffCount(PuffCount { count: 4 }))
        );
        assert_ne!(count, ChannelEvent::Session(SessionEvent::Connected));
    }

    #[tokio::test]
    async fn connect_presents_token() {
        let f = fixture();

        let status = f.channel.connect(AuthToken::new("tok")).await;

        assert_eq!(status, ConnectionStatus::Connected);
        assert_eq!(f.transport.presented_token(), Some("tok".into()));
        assert_eq!(f.transport.connected_url(), Some("ws://server".into()));
    }

    #[tokio::test]
    async fn connect_is_noop_when_connected() {
        let f = fixture();
        f.channel.connect(AuthToken::new("tok")).await;
        f.channel.connect(AuthToken::new("other")).await;

        assert_eq!(f.transport.connect_count(), 1);
        assert_eq!(f.transport.presented_token(), Some("tok".into()));
    }

    #[tokio::test]
    async fn resume_uses_stored_credential() {
        let f = fixture();
        let status = f.channel.resume().await.unwrap();

        assert_eq!(status, ConnectionStatus::Connected);
        assert_eq!(f.transport.presented_token(), Some("tok".into()));
    }

    #[tokio::test]
    async fn resume_without_credential_fails() {
        let transport = MockTransport::new();
        let channel =
            SessionChannel::new(transport.clone(), "ws://server", Arc::new(MemoryCredentialStore::new()));

        let result = channel.resume().await;
        assert!(matches!(result, Err(ChannelError::NoCredential)));
        assert_eq!(transport.connect_count(), 0);
    }

    #[tokio::test]
    async fn login_saves_credential() {
        let transport = MockTransport::new();
        let credentials = Arc::new(MemoryCredentialStore::new());
        let channel = SessionChannel::new(transport, "ws://server", credentials.clone());

        channel.login(AuthToken::new("fresh")).await.unwrap();

        assert!(credentials.has_token());
        assert_eq!(channel.status().await, ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn logout_deletes_credential_and_disconnects() {
        let f = fixture();
        f.channel.connect(AuthToken::new("tok")).await;

        f.channel.logout().await.unwrap();

        assert_eq!(f.channel.status().await, ConnectionStatus::Disconnected);
        assert!(!f.transport.is_connected());
        assert!(!f.credentials.has_token());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_connect_failure_retries_with_same_credential() {
        let f = fixture();
        f.transport.fail_next_connect("network unreachable");

        let status = f.channel.connect(AuthToken::new("tok")).await;
        assert_eq!(status, ConnectionStatus::Connecting);
        assert_eq!(
            f.channel.last_error().as_deref(),
            Some("connection failed: network unreachable")
        );

        // First backoff is at most 2s + 5s jitter
        tokio::time::sleep(Duration::from_secs(8)).await;

        assert_eq!(f.channel.status().await, ConnectionStatus::Connected);
        assert_eq!(f.transport.presented_token(), Some("tok".into()));
        assert_eq!(f.credentials.delete_calls(), 0);
        assert!(f.channel.last_error().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn server_drop_reconnects_without_clearing_credential() {
        let f = fixture();
        let mut rx = f.channel.subscribe();
        f.channel.connect(AuthToken::new("tok")).await;
        assert_eq!(next_event(&mut rx).await, ChannelEvent::Session(SessionEvent::Connected));

        f.transport.simulate_disconnect();
        assert!(matches!(
            next_event(&mut rx).await,
            ChannelEvent::Session(SessionEvent::Disconnected { .. })
        ));

        assert_eq!(next_event(&mut rx).await, ChannelEvent::Session(SessionEvent::Connected));
        assert_eq!(f.transport.connect_count(), 2);
        assert_eq!(f.credentials.delete_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_reconnect() {
        let f = fixture();
        f.transport.fail_next_connect("down");
        f.channel.connect(AuthToken::new("tok")).await;

        f.channel.disconnect().await;
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(f.channel.status().await, ConnectionStatus::Disconnected);
        assert_eq!(f.transport.connect_count(), 0);
    }

    // ===========================================
    // Emission
    // ===========================================

    #[tokio::test]
    async fn emit_dropped_when_disconnected() {
        let f = fixture();

        assert!(!f.channel.emit(&ClientEvent::GetPuffCount).await);
        assert!(matches!(
            f.channel.try_emit(&ClientEvent::GetPuffCount).await,
            Err(ChannelError::NotConnected)
        ));
        assert!(f.transport.sent_frames().is_empty());
    }

    #[tokio::test]
    async fn emit_sends_when_connected() {
        let f = fixture();
        f.channel.connect(AuthToken::new("tok")).await;

        assert!(f.channel.emit(&ClientEvent::GetPuffCount).await);
        assert_eq!(f.transport.sent_events(), vec![ClientEvent::GetPuffCount]);
    }

    // ===========================================
    // Inbound Dispatch
    // ===========================================

    #[tokio::test]
    async fn inbound_events_reach_subscribers() {
        let f = fixture();
        f.channel.connect(AuthToken::new("tok")).await;
        let mut rx = f.channel.subscribe();

        f.transport
            .push_event(&ServerEvent::PuffCount(PuffCount { count: 4 }));

        assert_eq!(
            next_event(&mut rx).await,
            ChannelEvent::Server(ServerEvent::PuffCount(PuffCount { count: 4 }))
        );
    }

    #[tokio::test]
    async fn undecodable_frames_are_skipped() {
        let f = fixture();
        f.channel.connect(AuthToken::new("tok")).await;
        let mut rx = f.channel.subscribe();

        f.transport.push_inbound(r#"{"event":"mystery"}"#);
        f.transport
            .push_event(&ServerEvent::PuffCount(PuffCount { count: 1 }));

        assert_eq!(
            next_event(&mut rx).await,
            ChannelEvent::Server(ServerEvent::PuffCount(PuffCount { count: 1 }))
        );
        assert_eq!(f.channel.status().await, ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn update_snapshot_is_retained() {
        let f = fixture();
        f.channel.connect(AuthToken::new("tok")).await;
        let mut rx = f.channel.subscribe();

        let sync = FullSyncResponse {
            user: User {
                id: "u1".into(),
                name: "Sam".into(),
                email: "sam@example.com".into(),
            },
            friends: vec![],
            sent_friend_requests: vec![],
            received_friend_requests: vec![],
        };
        f.transport.push_event(&ServerEvent::Update(UpdatePayload { sync: sync.clone() }));
        next_event(&mut rx).await;

        assert_eq!(f.channel.latest_snapshot(), Some(sync));
    }

    // ===========================================
    // Authentication Failures
    // ===========================================

    #[tokio::test]
    async fn auth_error_payload_forces_logout() {
        let f = fixture();
        f.channel.connect(AuthToken::new("tok")).await;
        let mut rx = f.channel.subscribe();

        f.transport
            .push_event(&server_error("Authentication error: bad token", None));

        // Logout is complete before the raw error is published
        assert!(matches!(
            next_event(&mut rx).await,
            ChannelEvent::Session(SessionEvent::AuthFailed { .. })
        ));
        assert_eq!(f.credentials.delete_calls(), 1);
        assert!(!f.transport.is_connected());
        assert!(matches!(
            next_event(&mut rx).await,
            ChannelEvent::Server(ServerEvent::Error(_))
        ));

        let status = f.channel.session_status().await;
        assert_eq!(status.status, ConnectionStatus::AuthFailed);
        assert_eq!(status.last_error.as_deref(), Some("Authentication error: bad token"));
    }

    #[tokio::test]
    async fn structured_code_overrides_message() {
        let f = fixture();
        f.channel.connect(AuthToken::new("tok")).await;
        let mut rx = f.channel.subscribe();

        f.transport
            .push_event(&server_error("friend is unauthorized to view", Some("FORBIDDEN_FRIEND")));
        next_event(&mut rx).await;

        assert_eq!(f.channel.status().await, ConnectionStatus::Connected);
        assert_eq!(f.credentials.delete_calls(), 0);
    }

    #[tokio::test]
    async fn ordinary_error_keeps_session() {
        let f = fixture();
        f.channel.connect(AuthToken::new("tok")).await;
        let mut rx = f.channel.subscribe();

        f.transport.push_event(&server_error("rate limited", None));
        next_event(&mut rx).await;

        assert_eq!(f.channel.status().await, ConnectionStatus::Connected);
        assert_eq!(f.channel.last_error().as_deref(), Some("rate limited"));
    }

    #[tokio::test(start_paused = true)]
    async fn unauthorized_handshake_is_never_retried() {
        let f = fixture();
        f.transport.fail_next_connect_unauthorized();

        let status = f.channel.connect(AuthToken::new("tok")).await;
        assert_eq!(status, ConnectionStatus::AuthFailed);
        assert_eq!(f.credentials.delete_calls(), 1);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(f.transport.connect_count(), 0);
        assert_eq!(f.channel.status().await, ConnectionStatus::AuthFailed);
    }

    #[tokio::test]
    async fn new_credential_after_auth_failure_connects() {
        let f = fixture();
        f.transport.fail_next_connect_unauthorized();
        f.channel.connect(AuthToken::new("stale")).await;

        let status = f.channel.login(AuthToken::new("fresh")).await.unwrap();

        assert_eq!(status, ConnectionStatus::Connected);
        assert_eq!(f.transport.presented_token(), Some("fresh".into()));
    }
}
