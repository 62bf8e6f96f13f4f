//! Transport abstraction for console streams.
//!
//! A transport offers three capabilities (connect, send, close) and reports
//! everything else through [`TransportEvent`]s delivered on an mpsc channel.
//! Every event is tagged with the [`HandleId`] of the connection that
//! produced it, so a session can tell events of its current connection apart
//! from late events of a connection it already replaced.
//!
//! Implementations:
//! - [`WebSocketTransport`]: tokio-tungstenite, one task per connection
//! - [`MemoryTransport`]: in-process recorder for driving sessions in tests

pub mod memory;
pub mod websocket;

use std::fmt;

use protocol::Result;
use tokio::sync::mpsc;
use url::Url;

pub use memory::MemoryTransport;
pub use websocket::{WebSocketConfig, WebSocketTransport};

/// Capacity of the event channel between a transport and its session.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Identity of one connection instance.
///
/// Handles are allocated by the session, strictly increasing, and never
/// reused within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }

    /// The handle allocated after this one.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What happened on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// The handshake completed.
    Opened,
    /// One inbound text frame.
    Message(String),
    /// A transport-level error. May or may not be followed by `Closed`.
    Errored(String),
    /// The connection is gone. Always the last event of a handle.
    Closed,
}

/// An event tagged with the connection that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    pub handle: HandleId,
    pub kind: EventKind,
}

impl TransportEvent {
    pub fn new(handle: HandleId, kind: EventKind) -> Self {
        Self { handle, kind }
    }
}

/// Sending half of a transport event channel.
pub type EventSender = mpsc::Sender<TransportEvent>;

/// Receiving half of a transport event channel.
pub type EventReceiver = mpsc::Receiver<TransportEvent>;

/// Creates an event channel with the default capacity.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}

/// Connection capabilities used by a console session.
///
/// All calls return immediately; outcomes arrive as events. Implementations
/// must never emit events for a handle after `close` was called for it, and
/// must emit `Closed` exactly once for every handle that was not closed by
/// the caller.
pub trait Transport: Send + 'static {
    /// Starts connecting `handle` to `url`.
    fn connect(&mut self, handle: HandleId, url: &Url);

    /// Queues one text frame on `handle`.
    fn send(&mut self, handle: HandleId, text: &str) -> Result<()>;

    /// Releases `handle`. Closing an unknown or finished handle is a no-op.
    fn close(&mut self, handle: HandleId);
}

/// Builds a transport bound to an event channel.
///
/// Used by the console manager, which creates one transport per session.
pub trait TransportFactory: Send + Sync {
    type Transport: Transport;

    fn create(&self, events: EventSender) -> Self::Transport;
}
