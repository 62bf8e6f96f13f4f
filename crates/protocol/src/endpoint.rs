//! Panel origin and endpoint URL construction.
//!
//! Everything the console talks to lives on the same host as the panel
//! itself. The stream endpoint is `/ws/{serverId}`; its scheme follows the
//! security of the panel origin (`https` → `wss`, `http` → `ws`). REST
//! endpoints live under `/api/`.

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::error::{ProtocolError, Result};
use crate::server::{ServerAction, ServerId};

/// First path segment of the console stream endpoint.
pub const STREAM_PATH_SEGMENT: &str = "ws";

/// First path segment of every REST endpoint.
pub const API_PATH_SEGMENT: &str = "api";

/// The origin (scheme, host, port) the panel is served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelOrigin {
    url: Url,
    secure: bool,
}

impl PanelOrigin {
    /// Parses a panel origin.
    ///
    /// Accepts page schemes (`http`, `https`) as well as stream schemes
    /// (`ws`, `wss`). Any path, query or fragment is ignored; only the host
    /// and port are kept.
    pub fn parse(origin: &str) -> Result<Self> {
        let url = Url::parse(origin.trim())?;

        let secure = match url.scheme() {
            "https" | "wss" => true,
            "http" | "ws" => false,
            other => {
                return Err(ProtocolError::UnsupportedScheme {
                    scheme: other.to_string(),
                })
            }
        };

        if url.host_str().map_or(true, str::is_empty) {
            return Err(ProtocolError::InvalidOrigin(format!(
                "missing host in {}",
                origin
            )));
        }

        Ok(Self { url, secure })
    }

    /// Whether the panel is served over TLS.
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// `host[:port]` of the panel.
    pub fn host(&self) -> String {
        match (self.url.host_str(), self.url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => String::new(),
        }
    }

    /// Scheme used for the console stream.
    pub fn stream_scheme(&self) -> &'static str {
        if self.secure {
            "wss"
        } else {
            "ws"
        }
    }

    /// Scheme used for REST calls.
    pub fn api_scheme(&self) -> &'static str {
        if self.secure {
            "https"
        } else {
            "http"
        }
    }

    /// URL of the live console stream for `server_id`.
    pub fn stream_url(&self, server_id: &ServerId) -> Result<Url> {
        self.build(
            self.stream_scheme(),
            [STREAM_PATH_SEGMENT, server_id.as_str()],
        )
    }

    /// URL of `GET /api/servers/{id}`.
    pub fn server_url(&self, server_id: &ServerId) -> Result<Url> {
        self.build(
            self.api_scheme(),
            [API_PATH_SEGMENT, "servers", server_id.as_str()],
        )
    }

    /// URL of `POST /api/servers/{id}/{action}`.
    pub fn action_url(&self, server_id: &ServerId, action: ServerAction) -> Result<Url> {
        self.build(
            self.api_scheme(),
            [API_PATH_SEGMENT, "servers", server_id.as_str(), action.as_str()],
        )
    }

    /// URL of `GET /api/servers/{id}/stats`.
    pub fn stats_url(&self, server_id: &ServerId) -> Result<Url> {
        self.build(
            self.api_scheme(),
            [API_PATH_SEGMENT, "servers", server_id.as_str(), "stats"],
        )
    }

    fn build<'a>(
        &self,
        scheme: &str,
        segments: impl IntoIterator<Item = &'a str>,
    ) -> Result<Url> {
        let mut url = self.url.clone();

        url.set_scheme(scheme).map_err(|_| {
            ProtocolError::InvalidOrigin(format!(
                "cannot switch {} to scheme {}",
                self.url, scheme
            ))
        })?;
        // Credentials never leave the origin string.
        let _ = url.set_username("");
        let _ = url.set_password(None);
        url.set_query(None);
        url.set_fragment(None);

        url.path_segments_mut()
            .map_err(|_| {
                ProtocolError::InvalidOrigin(format!("{} cannot carry a path", self.url))
            })?
            .clear()
            .extend(segments);

        Ok(url)
    }
}

impl FromStr for PanelOrigin {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for PanelOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.api_scheme(), self.host())
    }
}
