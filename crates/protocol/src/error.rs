//! Error types for the protocol crate.

use thiserror::Error;

/// Protocol error type covering all possible failure modes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    // Identifier errors
    /// Server identifier is empty or whitespace-only.
    #[error("invalid server id: {0:?}")]
    InvalidServerId(String),

    // Endpoint errors
    /// Panel origin could not be parsed as a URL.
    #[error("invalid panel origin: {0}")]
    InvalidOrigin(String),

    /// Panel origin uses a scheme that has no stream counterpart.
    #[error("unsupported scheme: {scheme} (expected http, https, ws or wss)")]
    UnsupportedScheme {
        /// The rejected scheme.
        scheme: String,
    },

    // Serialization errors
    /// Failed to serialize data.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Failed to deserialize data.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    // Connection errors
    /// Connection was closed unexpectedly.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// A frame could not be handed to the transport.
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

// Conversions from underlying crate errors

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_eof() || err.is_syntax() {
            ProtocolError::Deserialization(err.to_string())
        } else {
            ProtocolError::Serialization(err.to_string())
        }
    }
}

impl From<url::ParseError> for ProtocolError {
    fn from(err: url::ParseError) -> Self {
        ProtocolError::InvalidOrigin(err.to_string())
    }
}
