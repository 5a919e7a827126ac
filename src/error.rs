//! Error types for Gatelink

use std::time::Duration;

use thiserror::Error;

use crate::gateway::protocol::DecodeError;

/// Result type alias using Gatelink's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Gatelink
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Socket could not be created or opened
    #[error("Transport error: {0}")]
    Transport(String),

    /// Inbound frame could not be parsed
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// No challenge arrived within the handshake window
    #[error("Handshake timeout: no challenge within {0:?}")]
    HandshakeTimeout(Duration),

    /// Gateway is waiting for an operator to approve this device
    #[error("Pairing required: {0}")]
    PairingRequired(String),

    /// Gateway refused the handshake
    #[error("Handshake rejected ({code}): {message}")]
    HandshakeRejected {
        /// Server-supplied error code
        code: String,
        /// Server-supplied message
        message: String,
    },

    /// A request exceeded its deadline
    #[error("Request timeout: {method} got no response within {timeout:?}")]
    RequestTimeout {
        /// Method of the timed-out request
        method: String,
        /// Deadline that elapsed
        timeout: Duration,
    },

    /// Server answered with `ok: false`
    #[error("Request failed ({code}): {message}")]
    RequestFailed {
        /// Server-supplied error code
        code: String,
        /// Server-supplied message, or a generic fallback
        message: String,
    },

    /// Connection torn down while the request was outstanding
    #[error("Connection closed")]
    ConnectionClosed,

    /// Request issued while the connection is not ready
    #[error("Not connected to gateway")]
    NotConnected,

    /// Device identity error
    #[error("Identity error: {0}")]
    Identity(String),

    /// Key-value storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Transport(_)
                | Error::HandshakeTimeout(_)
                | Error::HandshakeRejected { .. }
                | Error::PairingRequired(_)
                | Error::RequestTimeout { .. }
                | Error::ConnectionClosed
                | Error::NotConnected
        )
    }

    /// Check if error belongs to a single request rather than the connection
    pub fn is_request_scoped(&self) -> bool {
        matches!(
            self,
            Error::RequestTimeout { .. }
                | Error::RequestFailed { .. }
                | Error::ConnectionClosed
                | Error::NotConnected
        )
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::Config(format!("Invalid gateway URL: {}", err))
    }
}
