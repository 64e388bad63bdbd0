//! Mock transport for testing.
//!
//! Records sent frames, delivers inbound frames, and injects failures. A
//! responder closure can play the server: every parsed outbound event is
//! handed to it and its replies are delivered on the inbound side.

use super::{Transport, TransportError};
use async_trait::async_trait;
use pufftrack_sync_types::{AuthToken, ClientEvent, ServerEvent};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

type Responder = Arc<dyn Fn(&ClientEvent) -> Vec<ServerEvent> + Send + Sync>;

/// Mock transport for testing.
///
/// Clones share state, so a test can keep a handle while the client owns
/// another.
#[derive(Default, Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
    inbound_rx: Arc<tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<String>>>>,
}

#[derive(Default)]
struct MockTransportInner {
    connected: bool,
    connected_url: Option<String>,
    presented_token: Option<String>,
    connect_count: usize,
    sent_frames: Vec<String>,
    pending_inbound: VecDeque<String>,
    inbound_tx: Option<mpsc::UnboundedSender<String>>,
    responder: Option<Responder>,
    fail_next_connect: Option<TransportError>,
    fail_next_send: Option<String>,
    fail_next_send_of: Option<String>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Play the server: `f` sees every outbound event and returns replies.
    pub fn respond_with<F>(&self, f: F)
    where
        F: Fn(&ClientEvent) -> Vec<ServerEvent> + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock().unwrap();
        inner.responder = Some(Arc::new(f));
    }

    /// Deliver a raw inbound frame.
    ///
    /// Frames pushed while disconnected are delivered on the next connect.
    pub fn push_inbound(&self, frame: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap();
        let frame = frame.into();
        match &inner.inbound_tx {
            Some(tx) if inner.connected => {
                let _ = tx.send(frame);
            }
            _ => inner.pending_inbound.push_back(frame),
        }
    }

    /// Deliver a server event.
    pub fn push_event(&self, event: &ServerEvent) {
        if let Ok(text) = event.to_text() {
            self.push_inbound(text);
        }
    }

    /// Drop the connection from the server side.
    pub fn simulate_disconnect(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.connected = false;
        inner.inbound_tx = None;
    }

    /// Get all frames that were sent.
    pub fn sent_frames(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner.sent_frames.clone()
    }

    /// Sent frames parsed as client events; unparseable frames are skipped.
    pub fn sent_events(&self) -> Vec<ClientEvent> {
        self.sent_frames()
            .iter()
            .filter_map(|f| ClientEvent::from_text(f).ok())
            .collect()
    }

    /// Get the URL that was connected to.
    pub fn connected_url(&self) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner.connected_url.clone()
    }

    /// Token presented on the last successful connect.
    pub fn presented_token(&self) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner.presented_token.clone()
    }

    /// Number of successful connects.
    pub fn connect_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.connect_count
    }

    /// Cause the next connect() to fail with the given error.
    pub fn fail_next_connect(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_connect = Some(TransportError::ConnectionFailed(error.to_string()));
    }

    /// Cause the next connect() to be refused as unauthorized.
    pub fn fail_next_connect_unauthorized(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_connect = Some(TransportError::Unauthorized("401 Unauthorized".into()));
    }

    /// Cause the next send() to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_send = Some(error.to_string());
    }

    /// Cause the next send() of the named event (e.g. `"addPuffs"`) to fail.
    pub fn fail_next_send_of(&self, event_name: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_send_of = Some(event_name.to_string());
    }
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock().unwrap();
        f.debug_struct("MockTransport")
            .field("connected", &inner.connected)
            .field("sent_frames", &inner.sent_frames.len())
            .field("pending_inbound", &inner.pending_inbound.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, url: &str, token: &AuthToken) -> Result<(), TransportError> {
        let rx = {
            let mut inner = self.inner.lock().unwrap();

            // Check for forced failure
            if let Some(error) = inner.fail_next_connect.take() {
                return Err(error);
            }

            let (tx, rx) = mpsc::unbounded_channel();
            for frame in inner.pending_inbound.drain(..) {
                let _ = tx.send(frame);
            }
            inner.inbound_tx = Some(tx);
            inner.connected = true;
            inner.connect_count += 1;
            inner.connected_url = Some(url.to_string());
            inner.presented_token = Some(token.expose().to_string());
            rx
        };

        // A reader still parked on the previous receiver wakes with None
        // once its sender is gone, releasing the slot.
        *self.inbound_rx.lock().await = Some(rx);
        Ok(())
    }

    async fn send(&self, frame: &str) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();

        if !inner.connected {
            return Err(TransportError::NotConnected);
        }

        // Check for forced failure
        if let Some(error) = inner.fail_next_send.take() {
            return Err(TransportError::SendFailed(error));
        }

        let parsed = ClientEvent::from_text(frame).ok();
        let fail_this = matches!(
            (&inner.fail_next_send_of, &parsed),
            (Some(name), Some(event)) if name == event.name()
        );
        if fail_this {
            let name = inner.fail_next_send_of.take().unwrap_or_default();
            return Err(TransportError::SendFailed(format!("{name} rejected")));
        }

        inner.sent_frames.push(frame.to_string());

        if let (Some(responder), Some(event)) = (inner.responder.clone(), parsed) {
            for reply in responder(&event) {
                if let (Some(tx), Ok(text)) = (&inner.inbound_tx, reply.to_text()) {
                    let _ = tx.send(text);
                }
            }
        }
        Ok(())
    }

    async fn recv(&self) -> Result<String, TransportError> {
        let mut slot = self.inbound_rx.lock().await;
        let rx = slot.as_mut().ok_or(TransportError::NotConnected)?;
        rx.recv().await.ok_or(TransportError::ConnectionClosed)
    }

    fn is_connected(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.connected
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.connected = false;
        inner.inbound_tx = None;
        Ok(())
    }
}
