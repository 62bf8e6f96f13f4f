//! Async driver for a console session.
//!
//! [`spawn_console`] moves a [`ConsoleSession`] into a task that is its only
//! owner. The task multiplexes transport events, user commands and the
//! reconnect deadline with `tokio::select!`, and republishes every new line
//! and state change as a [`ConsoleEvent`] on a broadcast channel. Views talk
//! to it through a cloneable [`ConsoleHandle`].

use protocol::{Line, ServerId};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;

use crate::session::{ConnectionState, ConsoleSession, SendError};
use crate::transport::{EventReceiver, Transport};

/// Capacity of the per-console event broadcast.
pub const CONSOLE_EVENT_CAPACITY: usize = 1024;

const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// What a view sees of a console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleEvent {
    /// A line was appended to the output.
    Line(Line),
    /// The connection state changed.
    StateChanged(ConnectionState),
    /// The session was closed and its task has ended.
    Stopped,
}

#[derive(Debug)]
enum ConsoleCommand {
    Send {
        text: String,
        reply: oneshot::Sender<Result<(), SendError>>,
    },
    History(oneshot::Sender<Vec<Line>>),
    Close,
}

/// Cloneable front end of a running console.
#[derive(Debug, Clone)]
pub struct ConsoleHandle {
    server_id: ServerId,
    commands: mpsc::Sender<ConsoleCommand>,
    events: broadcast::Sender<ConsoleEvent>,
    state: watch::Receiver<ConnectionState>,
}

impl ConsoleHandle {
    pub fn server_id(&self) -> &ServerId {
        &self.server_id
    }

    /// Sends one command line to the server.
    pub async fn send(&self, text: impl Into<String>) -> Result<(), SendError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(ConsoleCommand::Send {
                text: text.into(),
                reply,
            })
            .await
            .map_err(|_| SendError::SessionStopped)?;
        response.await.map_err(|_| SendError::SessionStopped)?
    }

    /// Buffered output so far.
    pub async fn history(&self) -> Result<Vec<Line>, SendError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(ConsoleCommand::History(reply))
            .await
            .map_err(|_| SendError::SessionStopped)?;
        response.await.map_err(|_| SendError::SessionStopped)
    }

    /// Tears the session down. Idempotent.
    pub async fn close(&self) {
        if self.commands.send(ConsoleCommand::Close).await.is_err() {
            tracing::debug!(server_id = %self.server_id, "Console already stopped");
        }
    }

    /// New subscription to the console's events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConsoleEvent> {
        self.events.subscribe()
    }

    /// Last published connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Whether the driver task is still accepting commands.
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }
}

/// Starts the driver task for `session`.
///
/// `events` must be the receiving half of the channel the session's
/// transport emits on. An idle session is opened right away. The returned
/// receiver is subscribed before the task starts, so it sees every event.
pub fn spawn_console<T: Transport>(
    session: ConsoleSession<T>,
    events: EventReceiver,
) -> (ConsoleHandle, broadcast::Receiver<ConsoleEvent>) {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let (event_tx, event_rx) = broadcast::channel(CONSOLE_EVENT_CAPACITY);
    let (state_tx, state_rx) = watch::channel(session.state());

    let handle = ConsoleHandle {
        server_id: session.server_id().clone(),
        commands: command_tx,
        events: event_tx.clone(),
        state: state_rx,
    };

    let task = ConsoleTask {
        flushed_seq: session.buffer().last_seq(),
        published_state: session.state(),
        session,
        events,
        commands: command_rx,
        broadcast: event_tx,
        state: state_tx,
    };
    tokio::spawn(task.run());

    (handle, event_rx)
}

struct ConsoleTask<T: Transport> {
    session: ConsoleSession<T>,
    events: EventReceiver,
    commands: mpsc::Receiver<ConsoleCommand>,
    broadcast: broadcast::Sender<ConsoleEvent>,
    state: watch::Sender<ConnectionState>,
    flushed_seq: u64,
    published_state: ConnectionState,
}

impl<T: Transport> ConsoleTask<T> {
    async fn run(mut self) {
        let server_id = self.session.server_id().clone();
        tracing::debug!(server_id = %server_id, "Console task started");

        if self.session.state() == ConnectionState::Idle {
            self.session.open();
        }
        self.publish();

        loop {
            let deadline = self.session.next_deadline();

            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => {
                        self.session.handle_event(event, now());
                    }
                    None => {
                        tracing::warn!(server_id = %server_id, "Transport event channel closed");
                        self.session.close();
                        break;
                    }
                },
                command = self.commands.recv() => match command {
                    Some(ConsoleCommand::Send { text, reply }) => {
                        let result = self.session.send(&text);
                        if let Err(e) = &result {
                            tracing::debug!(server_id = %server_id, error = %e, "Command not sent");
                        }
                        let _ = reply.send(result);
                    }
                    Some(ConsoleCommand::History(reply)) => {
                        let _ = reply.send(self.session.lines());
                    }
                    Some(ConsoleCommand::Close) | None => {
                        self.session.close();
                        break;
                    }
                },
                _ = sleep_until(deadline) => {
                    self.session.poll_reconnect(now());
                }
            }

            self.publish();
        }

        self.commands.close();
        self.publish();
        if self.broadcast.send(ConsoleEvent::Stopped).is_err() {
            tracing::trace!(server_id = %server_id, "No console subscribers left");
        }
        tracing::debug!(server_id = %server_id, "Console task stopped");
    }

    /// Forwards the state change and the lines appended since the last call.
    fn publish(&mut self) {
        let state = self.session.state();
        if state != self.published_state {
            self.published_state = state;
            self.state.send_replace(state);
            let _ = self.broadcast.send(ConsoleEvent::StateChanged(state));
        }

        let buffer = self.session.buffer();
        for line in buffer.since(self.flushed_seq) {
            let _ = self.broadcast.send(ConsoleEvent::Line(line.clone()));
        }
        self.flushed_seq = buffer.last_seq();
    }
}

fn now() -> std::time::Instant {
    Instant::now().into_std()
}

async fn sleep_until(deadline: Option<std::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ReconnectPolicy, SessionOptions, CONNECTED_MESSAGE};
    use crate::transport::{event_channel, EventKind, MemoryTransport};
    use protocol::{LineKind, PanelOrigin};
    use std::time::Duration;

    fn start() -> (ConsoleHandle, broadcast::Receiver<ConsoleEvent>, MemoryTransport) {
        let (tx, rx) = event_channel();
        let transport = MemoryTransport::new().with_events(tx);
        transport.set_auto_open(true);
        let observer = transport.clone();

        let session = ConsoleSession::new(
            ServerId::new("srv1").unwrap(),
            &PanelOrigin::parse("http://panel.local").unwrap(),
            transport,
            SessionOptions {
                reconnect: ReconnectPolicy::fixed(Duration::from_secs(5)),
                ..SessionOptions::default()
            },
        )
        .unwrap();

        let (handle, events) = spawn_console(session, rx);
        (handle, events, observer)
    }

    async fn next_line(events: &mut broadcast::Receiver<ConsoleEvent>) -> Line {
        loop {
            if let ConsoleEvent::Line(line) = events.recv().await.unwrap() {
                return line;
            }
        }
    }

    async fn wait_for_state(handle: &ConsoleHandle, target: ConnectionState) {
        let mut state = handle.watch_state();
        state.wait_for(|state| *state == target).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_and_publishes() {
        let (handle, mut events, observer) = start();

        assert_eq!(
            events.recv().await.unwrap(),
            ConsoleEvent::StateChanged(ConnectionState::Connecting)
        );
        assert_eq!(
            events.recv().await.unwrap(),
            ConsoleEvent::StateChanged(ConnectionState::Open)
        );
        let line = next_line(&mut events).await;
        assert_eq!(line.kind, LineKind::System);
        assert_eq!(line.text, CONNECTED_MESSAGE);

        assert_eq!(handle.state(), ConnectionState::Open);
        assert_eq!(observer.connect_count(), 1);
        assert!(handle.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_round_trip() {
        let (handle, mut events, observer) = start();
        wait_for_state(&handle, ConnectionState::Open).await;

        handle.send("say hello").await.unwrap();
        assert!(matches!(
            handle.send("   ").await,
            Err(SendError::EmptyCommand)
        ));

        let handle_id = observer.last_handle().unwrap();
        observer.emit(handle_id, EventKind::Message("[Server] hello".into()));

        let mut seen = Vec::new();
        while seen.len() < 3 {
            let line = next_line(&mut events).await;
            seen.push((line.kind, line.text));
        }
        assert_eq!(
            seen,
            vec![
                (LineKind::System, CONNECTED_MESSAGE.to_string()),
                (LineKind::Command, "say hello".to_string()),
                (LineKind::ServerOutput, "[Server] hello".to_string()),
            ]
        );
        assert_eq!(observer.sent_texts(), vec!["say hello".to_string()]);
        assert_eq!(handle.history().await.unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_delay() {
        let (handle, _events, observer) = start();
        wait_for_state(&handle, ConnectionState::Open).await;

        let first = observer.last_handle().unwrap();
        observer.emit(first, EventKind::Closed);
        wait_for_state(&handle, ConnectionState::Closed).await;

        tokio::time::sleep(Duration::from_millis(4900)).await;
        assert_eq!(observer.connect_count(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(observer.connect_count(), 2);
        wait_for_state(&handle, ConnectionState::Open).await;
        assert!(observer.last_handle().unwrap() > first);

        // Exactly one reconnect per close.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(observer.connect_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_while_disconnected() {
        let (handle, _events, observer) = start();
        wait_for_state(&handle, ConnectionState::Open).await;
        observer.emit(observer.last_handle().unwrap(), EventKind::Closed);
        wait_for_state(&handle, ConnectionState::Closed).await;

        assert!(matches!(
            handle.send("list").await,
            Err(SendError::NotConnected)
        ));
        assert!(observer.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_stops_task() {
        let (handle, mut events, observer) = start();
        wait_for_state(&handle, ConnectionState::Open).await;
        let connection = observer.last_handle().unwrap();

        handle.close().await;
        loop {
            if events.recv().await.unwrap() == ConsoleEvent::Stopped {
                break;
            }
        }

        assert!(!handle.is_running());
        assert_eq!(handle.state(), ConnectionState::Closed);
        assert_eq!(observer.closed(), vec![connection]);
        assert!(matches!(
            handle.send("list").await,
            Err(SendError::SessionStopped)
        ));
        assert!(handle.history().await.is_err());

        // No reconnect after teardown.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(observer.connect_count(), 1);

        // Closing twice is harmless.
        handle.close().await;
    }
}
