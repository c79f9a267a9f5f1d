//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while decoding or validating wire messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The body is not valid JSON for the expected message.
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),

    /// The body decoded but violates a protocol rule.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ProtocolError {
    /// Creates an invalid request error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }
}
