//! # sync-client
//!
//! Client library for PuffTrack puff sync.
//!
//! This is the main library that applications use to keep the local puff
//! ledger reconciled with the server.
//!
//! ## Features
//!
//! - **Local-first ledger**: puffs are persisted before anything touches the network
//! - **Session channel**: one authenticated WebSocket with reconnect and auth-failure logout
//! - **Reconciler**: single-flight, timeout-bounded batch sync with idempotent resend
//! - **Transport abstraction**: pluggable transport layer (WebSocket, mock)
//! - **Pure state machine**: uses sync-core for side-effect-free logic
//!
//! ## Example
//!
//! ```ignore
//! use pufftrack_sync_client::{PuffSync, SyncConfig, WebSocketTransport};
//!
//! let config = SyncConfig::new("wss://api.pufftrack.app");
//! let sync = PuffSync::open(config, WebSocketTransport::new(), credentials, store).await?;
//!
//! sync.resume_session().await?;
//! sync.record_puff(Utc::now(), TrackingMode::Vaping).await?;
//! sync.start();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod client;
pub mod credentials;
pub mod ledger;
pub mod reconciler;
pub mod store;
pub mod transport;

pub use channel::{ChannelError, ChannelEvent, SessionChannel, SessionStatus};
pub use client::{ClientError, PuffStats, PuffSync, SyncConfig};
pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use ledger::SharedLedger;
pub use reconciler::{ReconcileError, Reconciler, ReconcilerConfig, RunOutcome};
pub use store::{JsonFileLedgerStore, LedgerStore, MemoryLedgerStore, StoreError};
pub use transport::{
    MockTransport, Transport, TransportError, WebSocketTransport, WebSocketTransportConfig,
    MAX_MESSAGE_SIZE,
};
