//! Session channel state machine for PuffTrack sync.
//!
//! This module provides a pure, side-effect-free state machine for managing
//! the lifecycle of the authenticated event connection. The state machine
//! takes events as input and produces a new state plus a list of actions to
//! execute.
//!
//! The actual I/O (connecting, clearing credentials) is performed by
//! sync-client, not by this module.

use std::time::Duration;

/// Connection state machine - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected, not trying to connect.
    Disconnected,
    /// Connection attempt in progress.
    Connecting,
    /// Connected and authenticated; emission allowed.
    Connected,
    /// Connection lost, waiting to reconnect with the same credential.
    Reconnecting {
        /// Number of reconnection attempts so far.
        attempt: u32,
    },
    /// The server rejected the credential. Terminal until a new connect.
    AuthFailed {
        /// Why the credential was rejected.
        reason: String,
    },
}

/// Coarse status exposed to the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No connection.
    Disconnected,
    /// Connecting or waiting to reconnect.
    Connecting,
    /// Connected.
    Connected,
    /// Credential rejected; user must sign in again.
    AuthFailed,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::AuthFailed => "auth failed",
        };
        f.write_str(s)
    }
}

impl ConnectionState {
    /// Create a new state machine in the Disconnected state.
    pub fn new() -> Self {
        Self::Disconnected
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller (sync-client)
    /// is responsible for executing the returned actions.
    pub fn on_event(self, event: Event) -> (Self, Vec<Action>) {
        match (self, event) {
            // From Disconnected / AuthFailed (a fresh credential may follow a rejection)
            (Self::Disconnected | Self::AuthFailed { .. }, Event::ConnectRequested) => {
                (Self::Connecting, vec![Action::Connect])
            }

            // From Connecting
            (Self::Connecting, Event::ConnectSucceeded) => (
                Self::Connected,
                vec![Action::EmitEvent(SessionEvent::Connected)],
            ),
            (Self::Connecting, Event::ConnectFailed { error }) => (
                Self::Reconnecting { attempt: 1 },
                vec![
                    Action::EmitEvent(SessionEvent::ConnectionFailed { error }),
                    Action::StartReconnectTimer {
                        delay: calculate_backoff(1),
                    },
                ],
            ),
            (Self::Connecting, Event::DisconnectRequested) => {
                (Self::Disconnected, vec![Action::Disconnect])
            }

            // From Connected
            (Self::Connected, Event::Disconnected { reason }) => (
                Self::Reconnecting { attempt: 1 },
                vec![
                    Action::EmitEvent(SessionEvent::Disconnected { reason }),
                    Action::StartReconnectTimer {
                        delay: calculate_backoff(1),
                    },
                ],
            ),
            (Self::Connected, Event::DisconnectRequested) => (
                Self::Disconnected,
                vec![
                    Action::Disconnect,
                    Action::EmitEvent(SessionEvent::Disconnected {
                        reason: "user requested".into(),
                    }),
                ],
            ),

            // From Reconnecting
            (Self::Reconnecting { .. }, Event::ReconnectTimer) => {
                (Self::Connecting, vec![Action::Connect])
            }
            (Self::Reconnecting { .. }, Event::ConnectSucceeded) => (
                Self::Connected,
                vec![Action::EmitEvent(SessionEvent::Connected)],
            ),
            (Self::Reconnecting { attempt }, Event::ConnectFailed { error }) => {
                let next_attempt = attempt.saturating_add(1);
                (
                    Self::Reconnecting {
                        attempt: next_attempt,
                    },
                    vec![
                        Action::EmitEvent(SessionEvent::ReconnectFailed {
                            attempt: next_attempt,
                            error,
                        }),
                        Action::StartReconnectTimer {
                            delay: calculate_backoff(next_attempt),
                        },
                    ],
                )
            }
            (Self::Reconnecting { .. }, Event::DisconnectRequested) => {
                (Self::Disconnected, vec![Action::CancelReconnect])
            }

            // Credential rejected while live or trying: never retried
            (
                Self::Connecting | Self::Connected | Self::Reconnecting { .. },
                Event::AuthRejected { reason },
            ) => (
                Self::AuthFailed {
                    reason: reason.clone(),
                },
                vec![
                    Action::CancelReconnect,
                    Action::Disconnect,
                    Action::ClearCredential,
                    Action::EmitEvent(SessionEvent::AuthFailed { reason }),
                ],
            ),
            (Self::AuthFailed { .. }, Event::DisconnectRequested) => (Self::Disconnected, vec![]),

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Coarse status for display.
    pub fn status(&self) -> ConnectionStatus {
        match self {
            Self::Disconnected => ConnectionStatus::Disconnected,
            Self::Connecting | Self::Reconnecting { .. } => ConnectionStatus::Connecting,
            Self::Connected => ConnectionStatus::Connected,
            Self::AuthFailed { .. } => ConnectionStatus::AuthFailed,
        }
    }

    /// Check if currently connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if currently trying to connect.
    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting { .. })
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Events that can occur in the session lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Caller asked to connect with a credential.
    ConnectRequested,
    /// Transport connection (including the credential handshake) succeeded.
    ConnectSucceeded,
    /// Transport connection failed for a non-authentication reason.
    ConnectFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// Connection was lost.
    Disconnected {
        /// Reason for disconnection.
        reason: String,
    },
    /// The server rejected the credential.
    AuthRejected {
        /// Server-provided reason.
        reason: String,
    },
    /// Caller asked to disconnect.
    DisconnectRequested,
    /// Reconnect timer fired.
    ReconnectTimer,
}

/// Actions to be executed by the sync-client.
///
/// These are instructions, not side effects. The sync-client interprets
/// these and performs the actual I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Open the transport with the current credential.
    Connect,
    /// Close the transport.
    Disconnect,
    /// Start a timer for reconnection.
    StartReconnectTimer {
        /// Delay before attempting reconnection.
        delay: Duration,
    },
    /// Cancel any pending reconnect timer.
    CancelReconnect,
    /// Delete the stored credential.
    ClearCredential,
    /// Emit an event to the application.
    EmitEvent(SessionEvent),
}

/// Events emitted to the application layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Successfully connected.
    Connected,
    /// Connection failed.
    ConnectionFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// Disconnected from the server.
    Disconnected {
        /// Reason for disconnection.
        reason: String,
    },
    /// Reconnection attempt failed.
    ReconnectFailed {
        /// Which reconnection attempt this was.
        attempt: u32,
        /// Error message describing the failure.
        error: String,
    },
    /// Credential rejected; the session is over.
    AuthFailed {
        /// Server-provided reason.
        reason: String,
    },
}

/// Calculate reconnection backoff with jitter.
///
/// Formula: min(30s, 2^attempt seconds) + random(0..5000ms)
fn calculate_backoff(attempt: u32) -> Duration {
    let base_secs = 2u64.pow(attempt.min(5)).min(30);
    Duration::from_secs(base_secs) + Duration::from_millis(random_jitter_ms())
}

/// Generate random jitter between 0 and 5000 milliseconds.
///
/// Falls back to no jitter if the OS RNG is unavailable.
fn random_jitter_ms() -> u64 {
    let mut bytes = [0u8; 8];
    if getrandom::getrandom(&mut bytes).is_err() {
        return 0;
    }
    u64::from_le_bytes(bytes) % 5001
}
