//! In-process transport that records every call.
//!
//! Clones share the same record, so a test can keep one clone for
//! inspection while the session owns another. Events are not produced on
//! their own; the test feeds them to the session (or, when an event sender
//! is attached, can ask the transport to emit them).

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use protocol::{ProtocolError, Result};
use url::Url;

use super::{EventKind, EventSender, HandleId, Transport, TransportEvent, TransportFactory};

#[derive(Debug, Default)]
struct Record {
    connects: Vec<(HandleId, Url)>,
    sent: Vec<(HandleId, String)>,
    closed: Vec<HandleId>,
    live: HashSet<HandleId>,
    auto_open: bool,
    fail_sends: bool,
}

/// Recording transport for tests and offline use.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    record: Arc<Mutex<Record>>,
    events: Option<EventSender>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches an event sender used by `auto_open` and [`emit`](Self::emit).
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// When enabled, every `connect` immediately emits `Opened`.
    pub fn set_auto_open(&self, auto_open: bool) {
        self.lock().auto_open = auto_open;
    }

    /// When enabled, every `send` fails as if the socket had gone away.
    pub fn set_fail_sends(&self, fail: bool) {
        self.lock().fail_sends = fail;
    }

    /// Emits an event through the attached sender.
    ///
    /// Returns `false` when no sender is attached or the channel is full or
    /// closed.
    pub fn emit(&self, handle: HandleId, kind: EventKind) -> bool {
        if matches!(kind, EventKind::Closed) {
            self.lock().live.remove(&handle);
        }
        match &self.events {
            Some(tx) => tx.try_send(TransportEvent::new(handle, kind)).is_ok(),
            None => false,
        }
    }

    /// Every `connect` call, in order.
    pub fn connects(&self) -> Vec<(HandleId, Url)> {
        self.lock().connects.clone()
    }

    /// Number of `connect` calls so far.
    pub fn connect_count(&self) -> usize {
        self.lock().connects.len()
    }

    /// Handle passed to the most recent `connect`.
    pub fn last_handle(&self) -> Option<HandleId> {
        self.lock().connects.last().map(|(handle, _)| *handle)
    }

    /// Every frame accepted by `send`, in order.
    pub fn sent(&self) -> Vec<(HandleId, String)> {
        self.lock().sent.clone()
    }

    /// Text of every frame accepted by `send`, in order.
    pub fn sent_texts(&self) -> Vec<String> {
        self.lock().sent.iter().map(|(_, text)| text.clone()).collect()
    }

    /// Every `close` call, in order.
    pub fn closed(&self) -> Vec<HandleId> {
        self.lock().closed.clone()
    }

    /// Handles connected and neither closed by the caller nor by `emit`.
    pub fn live_handles(&self) -> Vec<HandleId> {
        let mut live: Vec<_> = self.lock().live.iter().copied().collect();
        live.sort();
        live
    }

    fn lock(&self) -> MutexGuard<'_, Record> {
        // A panicking test thread must not hide the record from the others.
        self.record.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Transport for MemoryTransport {
    fn connect(&mut self, handle: HandleId, url: &Url) {
        let auto_open = {
            let mut record = self.lock();
            record.connects.push((handle, url.clone()));
            record.live.insert(handle);
            record.auto_open
        };
        if auto_open {
            self.emit(handle, EventKind::Opened);
        }
    }

    fn send(&mut self, handle: HandleId, text: &str) -> Result<()> {
        let mut record = self.lock();
        if record.fail_sends {
            return Err(ProtocolError::SendFailed("send refused".to_string()));
        }
        if !record.live.contains(&handle) {
            return Err(ProtocolError::ConnectionClosed(format!(
                "handle {} is not connected",
                handle
            )));
        }
        record.sent.push((handle, text.to_string()));
        Ok(())
    }

    fn close(&mut self, handle: HandleId) {
        let mut record = self.lock();
        record.closed.push(handle);
        record.live.remove(&handle);
    }
}

impl TransportFactory for MemoryTransport {
    type Transport = MemoryTransport;

    fn create(&self, events: EventSender) -> MemoryTransport {
        self.clone().with_events(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::event_channel;

    fn url() -> Url {
        Url::parse("ws://localhost/ws/srv1").unwrap()
    }

    #[test]
    fn test_records_calls_across_clones() {
        let observer = MemoryTransport::new();
        let mut transport = observer.clone();
        let handle = HandleId::new(1);

        transport.connect(handle, &url());
        transport.send(handle, "list").unwrap();
        transport.close(handle);

        assert_eq!(observer.connect_count(), 1);
        assert_eq!(observer.last_handle(), Some(handle));
        assert_eq!(observer.sent_texts(), vec!["list".to_string()]);
        assert_eq!(observer.closed(), vec![handle]);
        assert!(observer.live_handles().is_empty());
    }

    #[test]
    fn test_send_on_unknown_handle_fails() {
        let mut transport = MemoryTransport::new();
        let result = transport.send(HandleId::new(3), "list");
        assert!(matches!(result, Err(ProtocolError::ConnectionClosed(_))));
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_fail_sends() {
        let mut transport = MemoryTransport::new();
        let handle = HandleId::new(1);
        transport.connect(handle, &url());
        transport.set_fail_sends(true);
        assert!(matches!(
            transport.send(handle, "list"),
            Err(ProtocolError::SendFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_auto_open_emits_opened() {
        let (tx, mut rx) = event_channel();
        let mut transport = MemoryTransport::new().with_events(tx);
        transport.set_auto_open(true);

        let handle = HandleId::new(1);
        transport.connect(handle, &url());

        let event = rx.recv().await.unwrap();
        assert_eq!(event, TransportEvent::new(handle, EventKind::Opened));
    }

    #[test]
    fn test_emit_without_sender() {
        let transport = MemoryTransport::new();
        assert!(!transport.emit(HandleId::new(1), EventKind::Opened));
    }
}
