//! # PanelConsole Library
//!
//! Live console sessions for game servers hosted on the panel.
//!
//! ## Overview
//!
//! Each hosted server exposes its process stdio as a WebSocket. This crate
//! keeps one streaming connection per console view, renders everything that
//! arrives as timestamped lines, forwards typed commands, and reconnects
//! when the stream drops.
//!
//! - **Session**: sans-I/O state machine owning the connection handle,
//!   output buffer and reconnect schedule
//! - **Transport**: connect/send/close capabilities plus tagged events,
//!   with a WebSocket and an in-memory implementation
//! - **Runner**: async driver that owns a session and publishes its output
//! - **Manager**: at most one running console per server
//! - **API**: REST client for start/stop/restart/kill and stats
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                     ConsoleManager                        │
//! │            DashMap<ServerId, ConsoleHandle>               │
//! ├───────────────────────────────────────────────────────────┤
//! │  ConsoleHandle ──commands──▶ console task ──events──▶ view│
//! │                               │                           │
//! │                       ConsoleSession<T>                   │
//! │                               │                           │
//! │                  Transport (WebSocket / Memory)           │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use console::{Config, ConsoleEvent, ConsoleManager};
//! use protocol::ServerId;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!     let manager = ConsoleManager::new(
//!         config.websocket_config(),
//!         config.origin()?,
//!         config.session_options(),
//!     );
//!
//!     let (console, mut events) = manager.open(ServerId::new("srv1")?)?;
//!     while let Ok(event) = events.recv().await {
//!         if let ConsoleEvent::Line(line) = event {
//!             println!("{}", line);
//!         }
//!     }
//!     console.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`session`]: Session state machine, output buffer, reconnect policy
//! - [`transport`]: Transport trait and implementations
//! - [`runner`]: Async session driver
//! - [`manager`]: Console registry
//! - [`api`]: Panel REST client
//! - [`config`]: Configuration loading and defaults
//! - [`render`]: Coloured terminal output
//! - [`logging`]: Tracing subscriber setup

pub mod api;
pub mod config;
pub mod logging;
pub mod manager;
pub mod render;
pub mod runner;
pub mod session;
pub mod transport;

// Re-export protocol for convenience
pub use protocol;

// Re-export config types for convenience
pub use config::{Config, ConfigError};

// Re-export session types for convenience
pub use session::{
    ConnectionState, ConsoleSession, OutputBuffer, ReconnectPolicy, SendError, SessionOptions,
};

// Re-export transport types for convenience
pub use transport::{
    EventKind, HandleId, MemoryTransport, Transport, TransportEvent, TransportFactory,
    WebSocketConfig, WebSocketTransport,
};

// Re-export driver types for convenience
pub use manager::ConsoleManager;
pub use runner::{spawn_console, ConsoleEvent, ConsoleHandle};

// Re-export API types for convenience
pub use api::{ApiError, PanelClient};
