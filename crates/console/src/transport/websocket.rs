//! WebSocket transport built on tokio-tungstenite.
//!
//! Each handle gets its own task. The task connects, splits the socket into
//! sink and stream, and then multiplexes three sources with `select!`:
//! outgoing frames queued by [`Transport::send`], inbound frames, and an
//! optional heartbeat. Closing a handle cancels its task through a
//! [`CancellationToken`]; a cancelled task emits no further events.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use protocol::{ProtocolError, Result};
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{EventKind, EventSender, HandleId, Transport, TransportEvent, TransportFactory};

/// Default connect timeout.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
/// Default heartbeat settings.
const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;
const DEFAULT_HEARTBEAT_TIMEOUT_SECS: u64 = 10;
/// Frames that may be queued per connection before `send` refuses.
const DEFAULT_OUTGOING_CAPACITY: usize = 256;

/// Settings for [`WebSocketTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct WebSocketConfig {
    /// Time allowed for TCP connect, TLS and the WebSocket handshake.
    pub connect_timeout: Duration,
    /// Interval between pings. `None` disables the heartbeat.
    pub heartbeat_interval: Option<Duration>,
    /// Extra time a pong may take before the connection is considered dead.
    pub heartbeat_timeout: Duration,
    /// Outgoing queue length per connection.
    pub outgoing_capacity: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            heartbeat_interval: Some(Duration::from_secs(DEFAULT_HEARTBEAT_INTERVAL_SECS)),
            heartbeat_timeout: Duration::from_secs(DEFAULT_HEARTBEAT_TIMEOUT_SECS),
            outgoing_capacity: DEFAULT_OUTGOING_CAPACITY,
        }
    }
}

impl WebSocketConfig {
    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the heartbeat interval; `None` disables pings.
    pub fn with_heartbeat(mut self, interval: Option<Duration>) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the pong grace period.
    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }
}

/// Per-handle bookkeeping.
struct Connection {
    outgoing: mpsc::Sender<String>,
    cancel: CancellationToken,
}

/// WebSocket-based transport.
///
/// `connect` spawns onto the current tokio runtime, so it must be called
/// from within one.
pub struct WebSocketTransport {
    config: WebSocketConfig,
    events: EventSender,
    connections: HashMap<HandleId, Connection>,
}

impl WebSocketTransport {
    pub fn new(config: WebSocketConfig, events: EventSender) -> Self {
        Self {
            config,
            events,
            connections: HashMap::new(),
        }
    }

    /// Number of handles that have not been closed by the caller.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl Transport for WebSocketTransport {
    fn connect(&mut self, handle: HandleId, url: &Url) {
        let (outgoing_tx, outgoing_rx) = mpsc::channel(self.config.outgoing_capacity.max(1));
        let cancel = CancellationToken::new();

        if let Some(previous) = self.connections.insert(
            handle,
            Connection {
                outgoing: outgoing_tx,
                cancel: cancel.clone(),
            },
        ) {
            tracing::warn!(handle = %handle, "Handle reused, cancelling previous connection");
            previous.cancel.cancel();
        }

        let task = ConnectionTask {
            handle,
            url: url.to_string(),
            config: self.config.clone(),
            events: self.events.clone(),
            outgoing: outgoing_rx,
            cancel,
        };
        tokio::spawn(task.run());
    }

    fn send(&mut self, handle: HandleId, text: &str) -> Result<()> {
        let connection = self.connections.get(&handle).ok_or_else(|| {
            ProtocolError::ConnectionClosed(format!("handle {} is not connected", handle))
        })?;

        connection
            .outgoing
            .try_send(text.to_string())
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    ProtocolError::SendFailed("outgoing queue is full".to_string())
                }
                mpsc::error::TrySendError::Closed(_) => {
                    ProtocolError::ConnectionClosed(format!("handle {} has ended", handle))
                }
            })
    }

    fn close(&mut self, handle: HandleId) {
        if let Some(connection) = self.connections.remove(&handle) {
            connection.cancel.cancel();
            tracing::debug!(handle = %handle, "Connection released");
        }
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        for (_, connection) in self.connections.drain() {
            connection.cancel.cancel();
        }
    }
}

impl TransportFactory for WebSocketConfig {
    type Transport = WebSocketTransport;

    fn create(&self, events: EventSender) -> WebSocketTransport {
        WebSocketTransport::new(self.clone(), events)
    }
}

/// Why a connected socket stopped.
enum Ending {
    /// Cancelled by the owner; emit nothing.
    Cancelled,
    /// The peer closed the stream cleanly.
    Remote,
    /// A transport error ended the connection.
    Failed(String),
}

struct ConnectionTask {
    handle: HandleId,
    url: String,
    config: WebSocketConfig,
    events: EventSender,
    outgoing: mpsc::Receiver<String>,
    cancel: CancellationToken,
}

impl ConnectionTask {
    async fn run(mut self) {
        tracing::info!(handle = %self.handle, url = %self.url, "Connecting to console stream");

        let connect = tokio::time::timeout(
            self.config.connect_timeout,
            connect_async(self.url.as_str()),
        );
        let ws_stream = tokio::select! {
            _ = self.cancel.cancelled() => return,
            result = connect => match result {
                Ok(Ok((ws_stream, _response))) => ws_stream,
                Ok(Err(e)) => {
                    tracing::warn!(handle = %self.handle, error = %e, "Console connection failed");
                    self.finish(Some(e.to_string())).await;
                    return;
                }
                Err(_) => {
                    tracing::warn!(handle = %self.handle, "Console connection timed out");
                    self.finish(Some(format!(
                        "connection timed out after {:?}",
                        self.config.connect_timeout
                    )))
                    .await;
                    return;
                }
            },
        };

        if !self.emit(EventKind::Opened).await {
            return;
        }

        let (mut ws_sink, mut ws_stream) = ws_stream.split();
        let mut heartbeat = self.config.heartbeat_interval.map(|interval| {
            let mut timer = tokio::time::interval_at(Instant::now() + interval, interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer
        });
        let mut last_pong = Instant::now();

        let ending = loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = ws_sink.send(WsMessage::Close(None)).await;
                    break Ending::Cancelled;
                }
                Some(text) = self.outgoing.recv() => {
                    if let Err(e) = ws_sink.send(WsMessage::Text(text)).await {
                        break Ending::Failed(e.to_string());
                    }
                }
                _ = tick(&mut heartbeat) => {
                    let limit = self.config.heartbeat_timeout
                        + self.config.heartbeat_interval.unwrap_or_default();
                    if last_pong.elapsed() > limit {
                        tracing::warn!(handle = %self.handle, "Heartbeat timeout");
                        break Ending::Failed("heartbeat timeout".to_string());
                    }
                    if let Err(e) = ws_sink.send(WsMessage::Ping(Vec::new())).await {
                        break Ending::Failed(e.to_string());
                    }
                    tracing::trace!(handle = %self.handle, "Sent heartbeat ping");
                }
                frame = ws_stream.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        if !self.emit(EventKind::Message(text)).await {
                            break Ending::Cancelled;
                        }
                    }
                    Some(Ok(WsMessage::Binary(data))) => {
                        let text = String::from_utf8_lossy(&data).into_owned();
                        if !self.emit(EventKind::Message(text)).await {
                            break Ending::Cancelled;
                        }
                    }
                    Some(Ok(WsMessage::Pong(_))) => {
                        last_pong = Instant::now();
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        tracing::info!(handle = %self.handle, frame = ?frame, "Console stream closed by server");
                        break Ending::Remote;
                    }
                    // Pings are answered by tungstenite itself.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Ending::Failed(e.to_string()),
                    None => break Ending::Remote,
                },
            }
        };

        match ending {
            Ending::Cancelled => {
                tracing::debug!(handle = %self.handle, "Connection task cancelled");
            }
            Ending::Remote => self.finish(None).await,
            Ending::Failed(reason) => self.finish(Some(reason)).await,
        }
    }

    /// Emits an optional error followed by the final `Closed`.
    async fn finish(&self, error: Option<String>) {
        if let Some(reason) = error {
            if !self.emit(EventKind::Errored(reason)).await {
                return;
            }
        }
        self.emit(EventKind::Closed).await;
    }

    /// Sends an event unless the handle was cancelled. Returns `false` when
    /// the task should stop.
    async fn emit(&self, kind: EventKind) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let event = TransportEvent::new(self.handle, kind);
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            result = self.events.send(event) => {
                if let Err(e) = result {
                    tracing::warn!(handle = %self.handle, error = %e, "Failed to deliver transport event - receiver may be dropped");
                    return false;
                }
                true
            }
        }
    }
}

/// Waits for the next heartbeat tick, or forever when disabled.
async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::event_channel;

    #[test]
    fn test_websocket_config_default() {
        let config = WebSocketConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.heartbeat_interval, Some(Duration::from_secs(30)));
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(10));
        assert_eq!(config.outgoing_capacity, 256);
    }

    #[test]
    fn test_websocket_config_builder() {
        let config = WebSocketConfig::default()
            .with_connect_timeout(Duration::from_secs(2))
            .with_heartbeat(None)
            .with_heartbeat_timeout(Duration::from_secs(1));

        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.heartbeat_interval, None);
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_send_without_connection_fails() {
        let (tx, _rx) = event_channel();
        let mut transport = WebSocketTransport::new(WebSocketConfig::default(), tx);

        let result = transport.send(HandleId::new(1), "list");
        assert!(matches!(result, Err(ProtocolError::ConnectionClosed(_))));
    }

    #[tokio::test]
    async fn test_refused_connection_reports_error_then_closed() {
        // Bind and drop a listener to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (tx, mut rx) = event_channel();
        let config = WebSocketConfig::default().with_connect_timeout(Duration::from_secs(5));
        let mut transport = WebSocketTransport::new(config, tx);
        let handle = HandleId::new(1);
        let url = Url::parse(&format!("ws://{}/ws/srv1", addr)).unwrap();

        transport.connect(handle, &url);

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("error event")
            .expect("channel open");
        assert_eq!(first.handle, handle);
        assert!(matches!(first.kind, EventKind::Errored(_)));

        let second = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("closed event")
            .expect("channel open");
        assert_eq!(second, TransportEvent::new(handle, EventKind::Closed));
    }

    #[tokio::test]
    async fn test_close_releases_connection() {
        let (tx, _rx) = event_channel();
        let mut transport = WebSocketTransport::new(WebSocketConfig::default(), tx);
        let handle = HandleId::new(1);
        let url = Url::parse("ws://127.0.0.1:9/ws/srv1").unwrap();

        transport.connect(handle, &url);
        assert_eq!(transport.connection_count(), 1);

        transport.close(handle);
        assert_eq!(transport.connection_count(), 0);

        // Closing twice is a no-op.
        transport.close(handle);
    }
}
