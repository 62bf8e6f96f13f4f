//! Registry of running consoles.
//!
//! At most one console runs per server. Opening a server that already has a
//! running console hands out the existing one.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use protocol::{PanelOrigin, ServerId};
use tokio::sync::broadcast;

use crate::runner::{spawn_console, ConsoleEvent, ConsoleHandle};
use crate::session::{ConsoleSession, SessionOptions};
use crate::transport::{event_channel, TransportFactory};

/// Owns the running consoles of one panel.
pub struct ConsoleManager<F: TransportFactory> {
    factory: F,
    origin: PanelOrigin,
    options: SessionOptions,
    consoles: DashMap<ServerId, ConsoleHandle>,
}

impl<F: TransportFactory> ConsoleManager<F> {
    pub fn new(factory: F, origin: PanelOrigin, options: SessionOptions) -> Self {
        Self {
            factory,
            origin,
            options,
            consoles: DashMap::new(),
        }
    }

    pub fn origin(&self) -> &PanelOrigin {
        &self.origin
    }

    /// Returns the running console for `server_id`, starting one if needed,
    /// together with a fresh event subscription.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(
        &self,
        server_id: ServerId,
    ) -> protocol::Result<(ConsoleHandle, broadcast::Receiver<ConsoleEvent>)> {
        let entry = self.consoles.entry(server_id.clone());
        if let Entry::Occupied(existing) = &entry {
            if existing.get().is_running() {
                let handle = existing.get().clone();
                let events = handle.subscribe();
                return Ok((handle, events));
            }
        }

        let (events_tx, events_rx) = event_channel();
        let transport = self.factory.create(events_tx);
        let session =
            ConsoleSession::new(server_id.clone(), &self.origin, transport, self.options.clone())?;
        let (handle, events) = spawn_console(session, events_rx);

        tracing::info!(server_id = %server_id, "Console started");
        entry.insert(handle.clone());
        Ok((handle, events))
    }

    /// Running console for `server_id`.
    pub fn get(&self, server_id: &ServerId) -> Option<ConsoleHandle> {
        self.consoles
            .get(server_id)
            .map(|entry| entry.value().clone())
            .filter(ConsoleHandle::is_running)
    }

    /// Tears down the console for `server_id`. Returns whether one existed.
    pub async fn close(&self, server_id: &ServerId) -> bool {
        match self.consoles.remove(server_id) {
            Some((_, handle)) => {
                handle.close().await;
                tracing::info!(server_id = %server_id, "Console closed");
                true
            }
            None => false,
        }
    }

    /// Tears down every console.
    pub async fn close_all(&self) {
        let handles: Vec<ConsoleHandle> = self
            .consoles
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        self.consoles.clear();

        for handle in handles {
            handle.close().await;
        }
    }

    /// Forgets consoles whose task has ended.
    pub fn prune(&self) {
        self.consoles.retain(|_, handle| handle.is_running());
    }

    /// Number of running consoles.
    pub fn count(&self) -> usize {
        self.consoles
            .iter()
            .filter(|entry| entry.value().is_running())
            .count()
    }

    /// Servers with a running console.
    pub fn server_ids(&self) -> Vec<ServerId> {
        self.consoles
            .iter()
            .filter(|entry| entry.value().is_running())
            .map(|entry| entry.key().clone())
            .collect()
    }
}
