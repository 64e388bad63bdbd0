//! Transport abstraction for PuffTrack sync.
//!
//! This module provides a pluggable transport layer that abstracts
//! the underlying connection mechanism (WebSocket, mock for testing).
//!
//! # Design
//!
//! The transport trait is async and connection-oriented:
//! - `connect()` establishes a connection, presenting the credential
//! - `send()` transmits one JSON text frame
//! - `recv()` waits for the next JSON text frame
//! - `close()` gracefully terminates
//!
//! `send()` and `recv()` may run concurrently: the session channel keeps a
//! reader task parked in `recv()` while emitting from other tasks.
//!
//! # Example
//!
//! ```ignore
//! let transport = MockTransport::new();
//! transport.connect("ws://localhost:3000", &token).await?;
//! transport.send(r#"{"event":"getPuffCount"}"#).await?;
//! let frame = transport.recv().await?;
//! ```

mod mock;
mod websocket;

pub use mock::MockTransport;
pub use websocket::{WebSocketTransport, WebSocketTransportConfig, MAX_MESSAGE_SIZE};

use async_trait::async_trait;
use pufftrack_sync_types::AuthToken;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The server refused the credential during the handshake.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The server address could not be used.
    #[error("invalid server address: {0}")]
    InvalidAddress(String),

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Connection timeout.
    #[error("connection timeout")]
    Timeout,
}

/// Transport trait for exchanging named-event frames with the server.
///
/// Implementations handle the underlying connection mechanism
/// (WebSocket, mock, etc).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to the server at `url`, authenticating with `token`.
    async fn connect(&self, url: &str, token: &AuthToken) -> Result<(), TransportError>;

    /// Send one text frame.
    async fn send(&self, frame: &str) -> Result<(), TransportError>;

    /// Receive the next text frame.
    ///
    /// Waits until a frame arrives or the connection closes.
    async fn recv(&self) -> Result<String, TransportError>;

    /// Check if currently connected.
    fn is_connected(&self) -> bool;

    /// Close the connection gracefully.
    async fn close(&self) -> Result<(), TransportError>;
}
