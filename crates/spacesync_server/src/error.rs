//! Error types for the sync server.

use spacesync_core::CoreError;
use spacesync_protocol::{ProtocolError, SpaceId};
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request contents.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The request body is not a valid message.
    #[error("malformed request: {0}")]
    Protocol(#[from] ProtocolError),

    /// The space does not exist.
    #[error("unknown space: {0}")]
    SpaceNotFound(SpaceId),

    /// Provisioning collided with an existing space.
    #[error("space already exists: {0}")]
    SpaceExists(SpaceId),

    /// The space cannot take another commit.
    #[error("space has no versions left: {0}")]
    VersionExhausted(SpaceId),

    /// The push carries more mutations than allowed.
    #[error("push batch too large: {size} > {max}")]
    BatchTooLarge {
        /// Mutations in the request.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// Engine failure.
    #[error("engine error: {0}")]
    Core(CoreError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<CoreError> for ServerError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::SpaceNotFound { space_id } => ServerError::SpaceNotFound(space_id),
            CoreError::SpaceExists { space_id } => ServerError::SpaceExists(space_id),
            CoreError::VersionExhausted { space_id } => ServerError::VersionExhausted(space_id),
            other => ServerError::Core(other),
        }
    }
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidRequest(_)
                | ServerError::Protocol(_)
                | ServerError::SpaceNotFound(_)
                | ServerError::SpaceExists(_)
                | ServerError::VersionExhausted(_)
                | ServerError::BatchTooLarge { .. }
        )
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(self, ServerError::Core(_) | ServerError::Internal(_))
    }

    /// Returns true if the request may succeed when sent again unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServerError::Core(err) if err.is_retryable())
    }

    /// HTTP-style status code for the error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::InvalidRequest(_) | ServerError::Protocol(_) => 400,
            ServerError::SpaceNotFound(_) => 404,
            ServerError::SpaceExists(_) | ServerError::VersionExhausted(_) => 409,
            ServerError::BatchTooLarge { .. } => 413,
            ServerError::Core(err) if err.is_retryable() => 503,
            ServerError::Core(_) | ServerError::Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::InvalidRequest("bad".into()).is_client_error());
        assert!(ServerError::Internal("oops".into()).is_server_error());
        assert!(!ServerError::InvalidRequest("bad".into()).is_server_error());
    }

    #[test]
    fn core_errors_are_mapped() {
        let err: ServerError = CoreError::space_not_found(&SpaceId::from("s")).into();
        assert!(matches!(err, ServerError::SpaceNotFound(_)));
        assert_eq!(err.status_code(), 404);

        let err: ServerError = CoreError::TransactionConflict {
            space_id: SpaceId::from("s"),
        }
        .into();
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), 503);

        let err: ServerError = CoreError::VersionExhausted {
            space_id: SpaceId::from("s"),
        }
        .into();
        assert!(err.is_client_error());
        assert_eq!(err.status_code(), 409);

        let err: ServerError = CoreError::journal_corruption(0, "bad").into();
        assert!(!err.is_retryable());
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn batch_too_large_display() {
        let err = ServerError::BatchTooLarge { size: 20, max: 10 };
        assert_eq!(err.status_code(), 413);
        let msg = err.to_string();
        assert!(msg.contains("20"));
        assert!(msg.contains("10"));
    }
}
