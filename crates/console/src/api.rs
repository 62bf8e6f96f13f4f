//! Panel REST client for server lifecycle and stats.

use std::time::Duration;

use protocol::{
    ActionResponse, ApiErrorBody, PanelOrigin, ProtocolError, ServerAction, ServerId,
    ServerInfo, ServerStats,
};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Default timeout for REST calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Errors returned by [`PanelClient`].
#[derive(Debug, Error)]
pub enum ApiError {
    /// A URL could not be built for the request.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The request failed before a response was received, or the body was
    /// not valid JSON.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The panel rejected the credentials.
    #[error("unauthorized ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    /// Any other non-2xx response.
    #[error("panel returned {status}: {message}")]
    Status { status: u16, message: String },
}

impl ApiError {
    /// Builds the error for a non-2xx response, preferring the JSON `error`
    /// field over the raw body.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<ApiErrorBody>(body)
            .ok()
            .map(|parsed| parsed.error)
            .filter(|error| !error.is_empty())
            .unwrap_or_else(|| {
                let trimmed = body.trim();
                if trimmed.is_empty() {
                    status
                        .canonical_reason()
                        .unwrap_or("unknown error")
                        .to_string()
                } else {
                    trimmed.to_string()
                }
            });

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized {
                status: status.as_u16(),
                message,
            },
            _ => ApiError::Status {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// HTTP status, when the panel answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { status, .. } | ApiError::Status { status, .. } => {
                Some(*status)
            }
            ApiError::Http(e) => e.status().map(|s| s.as_u16()),
            ApiError::Protocol(_) => None,
        }
    }
}

/// Result type alias for REST calls.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Client for the panel's `/api/servers` endpoints.
#[derive(Debug, Clone)]
pub struct PanelClient {
    client: Client,
    origin: PanelOrigin,
    token: Option<String>,
}

impl PanelClient {
    /// Creates a client with the default timeout.
    pub fn new(origin: PanelOrigin) -> Result<Self> {
        Self::with_timeout(origin, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(origin: PanelOrigin, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("panel-console/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            origin,
            token: None,
        })
    }

    /// Sends `Authorization: Bearer {token}` with every request.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn origin(&self) -> &PanelOrigin {
        &self.origin
    }

    /// `POST /api/servers/{id}/{action}`. Returns the panel's message.
    pub async fn action(&self, server_id: &ServerId, action: ServerAction) -> Result<String> {
        let url = self.origin.action_url(server_id, action)?;
        tracing::info!(server_id = %server_id, action = action.as_str(), "Requesting server action");
        let response: ActionResponse = self.execute(self.client.post(url)).await?;
        Ok(response.message)
    }

    pub async fn start(&self, server_id: &ServerId) -> Result<String> {
        self.action(server_id, ServerAction::Start).await
    }

    pub async fn stop(&self, server_id: &ServerId) -> Result<String> {
        self.action(server_id, ServerAction::Stop).await
    }

    pub async fn restart(&self, server_id: &ServerId) -> Result<String> {
        self.action(server_id, ServerAction::Restart).await
    }

    pub async fn kill(&self, server_id: &ServerId) -> Result<String> {
        self.action(server_id, ServerAction::Kill).await
    }

    /// `GET /api/servers/{id}/stats`.
    pub async fn stats(&self, server_id: &ServerId) -> Result<ServerStats> {
        let url = self.origin.stats_url(server_id)?;
        self.execute(self.client.get(url)).await
    }

    /// `GET /api/servers/{id}`.
    pub async fn server(&self, server_id: &ServerId) -> Result<ServerInfo> {
        let url = self.origin.server_url(server_id)?;
        self.execute(self.client.get(url)).await
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = ApiError::from_response(status, &body);
            tracing::warn!(status = status.as_u16(), error = %error, "Panel request failed");
            return Err(error);
        }

        // Some actions answer with an empty body.
        let body = response.bytes().await?;
        let json: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
            b"{}"
        } else {
            &body
        };
        serde_json::from_slice(json).map_err(|e| ApiError::Protocol(e.into()))
    }
}
