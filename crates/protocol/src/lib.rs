//! # PanelConsole Protocol Library
//!
//! Shared vocabulary between the panel's live console and anything that
//! talks to it.
//!
//! ## Overview
//!
//! The panel exposes each hosted game server's stdio as a WebSocket at
//! `/ws/{serverId}` on the panel host, plus a small REST surface for
//! lifecycle transitions. This crate provides:
//!
//! - **Server identity**: [`ServerId`] and [`ServerAction`]
//! - **Endpoints**: [`PanelOrigin`], which derives `ws`/`wss` stream URLs and
//!   `http`/`https` REST URLs from the origin the panel is served from
//! - **Console lines**: [`Line`] and [`LineKind`], the rendered rows of a
//!   console pane
//! - **REST types**: [`ServerStats`], [`ServerInfo`]
//!
//! The stream itself is unstructured: one text frame in either direction is
//! one line of output or one command. There is no envelope to define.
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{Line, PanelOrigin, ServerId};
//!
//! let origin = PanelOrigin::parse("https://panel.example.com").unwrap();
//! let server = ServerId::new("srv1").unwrap();
//!
//! let url = origin.stream_url(&server).unwrap();
//! assert_eq!(url.as_str(), "wss://panel.example.com/ws/srv1");
//!
//! let line = Line::system("Connected to server console");
//! assert!(line.render().ends_with("[SYSTEM] Connected to server console"));
//! ```
//!
//! ## Modules
//!
//! - [`server`]: Server identifiers and lifecycle actions
//! - [`endpoint`]: Origin parsing and URL construction
//! - [`line`]: Console line model and rendering
//! - [`api`]: REST response types
//! - [`error`]: Error types

pub mod api;
pub mod endpoint;
pub mod error;
pub mod line;
pub mod server;

pub use api::{
    format_uptime, format_usage, usage_percent, ActionResponse, ApiErrorBody, ServerInfo,
    ServerStats, DEFAULT_DISK_LIMIT_MB, DEFAULT_MEMORY_LIMIT_MB,
};
pub use endpoint::{PanelOrigin, API_PATH_SEGMENT, STREAM_PATH_SEGMENT};
pub use error::{ProtocolError, Result};
pub use line::{Line, LineKind, TIMESTAMP_FORMAT};
pub use server::{ServerAction, ServerId};
