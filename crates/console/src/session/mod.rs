//! Console session state machine.
//!
//! A [`ConsoleSession`] owns the live stream of one game server's console:
//! the current connection handle, the output buffer, the pending reconnect
//! and the pending input text. It performs no I/O of its own. The caller
//! feeds it transport events and the current time, and asks it for the next
//! deadline; the async driver in [`crate::runner`] does exactly that.
//!
//! State machine:
//!
//! ```text
//!   idle ──open──▶ connecting ──Opened──▶ open
//!                     ▲                    │
//!                     │ reconnect delay    │ Closed
//!                     └────── closed ◀─────┘
//! ```
//!
//! Events tagged with a handle other than the current one are stale and are
//! dropped without touching state or output.

pub mod buffer;
pub mod reconnect;

use std::time::Instant;

use protocol::{Line, PanelOrigin, ProtocolError, ServerId};
use thiserror::Error;
use url::Url;

use crate::transport::{EventKind, HandleId, Transport, TransportEvent};

pub use buffer::{OutputBuffer, DEFAULT_BUFFER_CAPACITY};
pub use reconnect::{ReconnectPolicy, Reconnector, DEFAULT_RECONNECT_DELAY};

/// System line appended when the stream opens.
pub const CONNECTED_MESSAGE: &str = "Connected to server console";
/// System line appended when the stream closes.
pub const DISCONNECTED_MESSAGE: &str = "Console disconnected";
/// Prefix of the error line appended on transport errors.
pub const CONNECTION_ERROR_PREFIX: &str = "Console connection error: ";

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Never opened.
    Idle,
    /// Handshake in progress.
    Connecting,
    /// Commands can be sent.
    Open,
    /// No connection; a reconnect may be pending.
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a command was not sent. In every case nothing was transmitted and
/// the output buffer is unchanged.
#[derive(Debug, Error)]
pub enum SendError {
    /// The command is empty after trimming.
    #[error("empty command")]
    EmptyCommand,

    /// The stream is not open.
    #[error("not connected")]
    NotConnected,

    /// The session driver is gone.
    #[error("console session stopped")]
    SessionStopped,

    /// The transport refused the frame.
    #[error("transport error: {0}")]
    Transport(#[from] ProtocolError),
}

/// Tunables for a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub buffer_capacity: usize,
    pub reconnect: ReconnectPolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Live console of one server.
pub struct ConsoleSession<T: Transport> {
    server_id: ServerId,
    stream_url: Url,
    transport: T,
    state: ConnectionState,
    handle: Option<HandleId>,
    next_handle: HandleId,
    buffer: OutputBuffer,
    reconnector: Reconnector,
    reconnect_at: Option<Instant>,
    torn_down: bool,
    input: String,
}

impl<T: Transport> ConsoleSession<T> {
    /// Creates an idle session for `server_id` on the panel at `origin`.
    ///
    /// Fails only when no stream URL can be derived from the origin.
    pub fn new(
        server_id: ServerId,
        origin: &PanelOrigin,
        transport: T,
        options: SessionOptions,
    ) -> protocol::Result<Self> {
        let stream_url = origin.stream_url(&server_id)?;
        Ok(Self {
            server_id,
            stream_url,
            transport,
            state: ConnectionState::Idle,
            handle: None,
            next_handle: HandleId::new(1),
            buffer: OutputBuffer::new(options.buffer_capacity),
            reconnector: Reconnector::new(options.reconnect),
            reconnect_at: None,
            torn_down: false,
            input: String::new(),
        })
    }

    /// Opens (or reopens) the stream and returns the new handle.
    ///
    /// Any current handle is released first and its late events become
    /// stale. Revives a session that was closed with [`close`](Self::close).
    pub fn open(&mut self) -> HandleId {
        self.torn_down = false;
        self.reconnector.reset();
        self.connect()
    }

    fn connect(&mut self) -> HandleId {
        if let Some(old) = self.handle.take() {
            tracing::debug!(server_id = %self.server_id, handle = %old, "Releasing console stream");
            self.transport.close(old);
            self.state = ConnectionState::Closed;
        }
        self.reconnect_at = None;

        let handle = self.next_handle;
        self.next_handle = handle.next();
        self.handle = Some(handle);
        self.state = ConnectionState::Connecting;

        tracing::info!(
            server_id = %self.server_id,
            handle = %handle,
            url = %self.stream_url,
            "Opening console stream"
        );
        self.transport.connect(handle, &self.stream_url);
        handle
    }

    /// Applies one transport event. Returns `false` when the event was stale
    /// and therefore ignored.
    pub fn handle_event(&mut self, event: TransportEvent, now: Instant) -> bool {
        if self.handle != Some(event.handle) {
            tracing::trace!(
                server_id = %self.server_id,
                handle = %event.handle,
                "Dropping stale console event"
            );
            return false;
        }

        match event.kind {
            EventKind::Opened => {
                tracing::info!(server_id = %self.server_id, handle = %event.handle, "Console stream open");
                self.state = ConnectionState::Open;
                self.reconnector.reset();
                self.buffer.push(Line::system(CONNECTED_MESSAGE));
            }
            EventKind::Message(text) => {
                self.buffer.push(Line::server_output(text));
            }
            EventKind::Errored(error) => {
                tracing::warn!(server_id = %self.server_id, handle = %event.handle, error = %error, "Console stream error");
                self.buffer
                    .push(Line::error(format!("{}{}", CONNECTION_ERROR_PREFIX, error)));
            }
            EventKind::Closed => {
                tracing::info!(server_id = %self.server_id, handle = %event.handle, "Console stream closed");
                self.handle = None;
                self.transport.close(event.handle);
                self.state = ConnectionState::Closed;
                self.buffer.push(Line::system(DISCONNECTED_MESSAGE));
                self.schedule_reconnect(now);
            }
        }
        true
    }

    fn schedule_reconnect(&mut self, now: Instant) {
        if self.torn_down {
            return;
        }
        match self.reconnector.next_delay() {
            Some(delay) => {
                tracing::debug!(
                    server_id = %self.server_id,
                    delay_ms = delay.as_millis() as u64,
                    attempt = self.reconnector.attempts(),
                    "Scheduling console reconnect"
                );
                self.reconnect_at = Some(now + delay);
            }
            None => {
                let attempts = self.reconnector.attempts();
                tracing::warn!(server_id = %self.server_id, attempts, "Giving up on console reconnect");
                self.reconnect_at = None;
                self.buffer.push(Line::system(format!(
                    "Giving up after {} reconnect attempts",
                    attempts
                )));
            }
        }
    }

    /// Sends one command.
    ///
    /// The trimmed text is transmitted as a single frame, echoed as a
    /// command line and the pending input is cleared.
    pub fn send(&mut self, text: &str) -> Result<(), SendError> {
        let command = text.trim();
        if command.is_empty() {
            return Err(SendError::EmptyCommand);
        }
        let handle = match (self.state, self.handle) {
            (ConnectionState::Open, Some(handle)) => handle,
            _ => return Err(SendError::NotConnected),
        };

        self.transport.send(handle, command)?;
        tracing::debug!(server_id = %self.server_id, command, "Sent console command");
        self.buffer.push(Line::command(command));
        self.input.clear();
        Ok(())
    }

    /// Sends the pending input.
    pub fn submit(&mut self) -> Result<(), SendError> {
        let text = std::mem::take(&mut self.input);
        let result = self.send(&text);
        if result.is_err() {
            self.input = text;
        }
        result
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    /// Tears the session down: releases the handle, cancels any pending
    /// reconnect. Later events are stale; nothing reconnects until
    /// [`open`](Self::open) is called again.
    pub fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            tracing::info!(server_id = %self.server_id, handle = %handle, "Closing console session");
            self.transport.close(handle);
        }
        self.reconnect_at = None;
        self.torn_down = true;
        if self.state != ConnectionState::Idle {
            self.state = ConnectionState::Closed;
        }
    }

    /// Fires the pending reconnect if its deadline has passed.
    pub fn poll_reconnect(&mut self, now: Instant) -> Option<HandleId> {
        if self.torn_down {
            return None;
        }
        match self.reconnect_at {
            Some(deadline) if now >= deadline => Some(self.connect()),
            _ => None,
        }
    }

    /// Deadline of the pending reconnect.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.reconnect_at
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Current connection handle, if any.
    pub fn handle(&self) -> Option<HandleId> {
        self.handle
    }

    pub fn server_id(&self) -> &ServerId {
        &self.server_id
    }

    pub fn stream_url(&self) -> &Url {
        &self.stream_url
    }

    pub fn buffer(&self) -> &OutputBuffer {
        &self.buffer
    }

    /// Copy of the buffered lines.
    pub fn lines(&self) -> Vec<Line> {
        self.buffer.to_vec()
    }

    /// Whether [`close`](Self::close) was called and not undone by `open`.
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Reconnect attempts since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnector.attempts()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

impl<T: Transport> Drop for ConsoleSession<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.transport.close(handle);
        }
    }
}
