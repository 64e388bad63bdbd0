//! WebSocketTransport - real transport over a WebSocket connection.
//!
//! The credential travels as a `token` query parameter on the upgrade
//! request; a 401/403 on the handshake is reported as
//! [`TransportError::Unauthorized`].

use super::{Transport, TransportError};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use pufftrack_sync_types::AuthToken;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

/// Maximum frame size accepted in either direction.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Configuration for WebSocketTransport.
#[derive(Clone, Debug)]
pub struct WebSocketTransportConfig {
    /// Connection (and handshake) timeout.
    pub connect_timeout: Duration,
    /// Send timeout.
    pub operation_timeout: Duration,
}

impl Default for WebSocketTransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(20),
            operation_timeout: Duration::from_secs(30),
        }
    }
}

/// WebSocketTransport implements the Transport trait over tokio-tungstenite.
///
/// Send and receive halves are locked separately so a reader parked in
/// `recv()` never blocks `send()`. `close()` bumps `shutdown`, which wakes a
/// parked reader so the stream half can be dropped even if the peer never
/// answers the close frame.
pub struct WebSocketTransport {
    sink: Mutex<Option<SplitSink<WsStream, Message>>>,
    stream: Mutex<Option<SplitStream<WsStream>>>,
    connected: AtomicBool,
    shutdown: watch::Sender<u64>,
    config: WebSocketTransportConfig,
}

impl WebSocketTransport {
    /// Create a new, unconnected WebSocketTransport.
    pub fn new() -> Self {
        Self::with_config(WebSocketTransportConfig::default())
    }

    /// Create a new WebSocketTransport with custom configuration.
    pub fn with_config(config: WebSocketTransportConfig) -> Self {
        Self {
            sink: Mutex::new(None),
            stream: Mutex::new(None),
            connected: AtomicBool::new(false),
            shutdown: watch::channel(0).0,
            config,
        }
    }

    /// Build the upgrade URL: `http(s)` becomes `ws(s)`, token appended.
    fn endpoint_url(base: &str, token: &AuthToken) -> Result<Url, TransportError> {
        let mut url =
            Url::parse(base).map_err(|e| TransportError::InvalidAddress(format!("{base}: {e}")))?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(TransportError::InvalidAddress(format!(
                    "unsupported scheme: {other}"
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| TransportError::InvalidAddress(format!("cannot use scheme {scheme}")))?;
        url.query_pairs_mut().append_pair("token", token.expose());
        Ok(url)
    }

    fn map_connect_error(err: tungstenite::Error) -> TransportError {
        match err {
            tungstenite::Error::Http(response)
                if matches!(response.status().as_u16(), 401 | 403) =>
            {
                TransportError::Unauthorized(format!(
                    "server rejected credential ({})",
                    response.status()
                ))
            }
            other => TransportError::ConnectionFailed(other.to_string()),
        }
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, url: &str, token: &AuthToken) -> Result<(), TransportError> {
        let url = Self::endpoint_url(url, token)?;

        // Close existing connection if any
        self.close().await.ok();

        let (ws, _response) = tokio::time::timeout(
            self.config.connect_timeout,
            tokio_tungstenite::connect_async(url.as_str()),
        )
        .await
        .map_err(|_| TransportError::Timeout)?
        .map_err(Self::map_connect_error)?;

        let (sink, stream) = ws.split();
        *self.stream.lock().await = Some(stream);
        *self.sink.lock().await = Some(sink);
        self.connected.store(true, Ordering::SeqCst);

        Ok(())
    }

    async fn send(&self, frame: &str) -> Result<(), TransportError> {
        if frame.len() > MAX_MESSAGE_SIZE {
            return Err(TransportError::SendFailed(format!(
                "Message too large: {} > {}",
                frame.len(),
                MAX_MESSAGE_SIZE
            )));
        }

        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(TransportError::NotConnected)?;

        tokio::time::timeout(
            self.config.operation_timeout,
            sink.send(Message::Text(frame.to_string())),
        )
        .await
        .map_err(|_| TransportError::Timeout)?
        .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn recv(&self) -> Result<String, TransportError> {
        // Subscribe before taking the lock: a close() that lands while we
        // wait for it still wakes us below.
        let mut shutdown = self.shutdown.subscribe();
        let mut guard = self.stream.lock().await;
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        let stream = guard.as_mut().ok_or(TransportError::NotConnected)?;

        loop {
            let next = tokio::select! {
                _ = shutdown.changed() => return Err(TransportError::ConnectionClosed),
                next = stream.next() => next,
            };
            match next {
                Some(Ok(Message::Text(text))) => {
                    if text.len() > MAX_MESSAGE_SIZE {
                        return Err(TransportError::ReceiveFailed(format!(
                            "Message too large: {} > {}",
                            text.len(),
                            MAX_MESSAGE_SIZE
                        )));
                    }
                    return Ok(text);
                }
                Some(Ok(Message::Binary(bytes))) => {
                    return String::from_utf8(bytes)
                        .map_err(|e| TransportError::ReceiveFailed(format!("non-UTF-8 frame: {e}")));
                }
                // Pongs are queued by tungstenite and flushed on the next send
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Ok(Message::Close(_))) | None => {
                    self.connected.store(false, Ordering::SeqCst);
                    return Err(TransportError::ConnectionClosed);
                }
                Some(Err(e)) => {
                    self.connected.store(false, Ordering::SeqCst);
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        self.shutdown.send_modify(|generation| *generation += 1);

        if let Some(mut sink) = self.sink.lock().await.take() {
            tokio::time::timeout(self.config.operation_timeout, sink.close())
                .await
                .ok();
        }
        // Any parked reader has been woken and releases the lock promptly
        self.stream.lock().await.take();
        Ok(())
    }
}
