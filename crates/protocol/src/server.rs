//! Server identifiers and lifecycle actions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};

/// Opaque identifier of one hosted game server.
///
/// The panel never interprets it; it is only substituted into stream and
/// REST paths. The only constraint is that it is not blank.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerId(String);

impl ServerId {
    /// Creates a server ID, rejecting empty and whitespace-only values.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ProtocolError::InvalidServerId(id));
        }
        Ok(Self(id))
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ServerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for ServerId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for ServerId {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ServerId> for String {
    fn from(id: ServerId) -> Self {
        id.0
    }
}

/// Lifecycle transitions exposed by `POST /api/servers/{id}/{action}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerAction {
    Start,
    Stop,
    Restart,
    Kill,
}

impl ServerAction {
    /// All actions, in the order the panel shows them.
    pub const ALL: [ServerAction; 4] = [
        ServerAction::Start,
        ServerAction::Stop,
        ServerAction::Restart,
        ServerAction::Kill,
    ];

    /// Path segment used by the REST endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerAction::Start => "start",
            ServerAction::Stop => "stop",
            ServerAction::Restart => "restart",
            ServerAction::Kill => "kill",
        }
    }

    /// Present-progressive label ("starting", ...) for status messages.
    pub fn progress_label(&self) -> &'static str {
        match self {
            ServerAction::Start => "starting",
            ServerAction::Stop => "stopping",
            ServerAction::Restart => "restarting",
            ServerAction::Kill => "being killed",
        }
    }
}

impl fmt::Display for ServerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
