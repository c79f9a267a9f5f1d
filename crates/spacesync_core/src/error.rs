//! Error types for the synchronization engine.

use spacesync_protocol::SpaceId;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The space has no cookie; it was never provisioned.
    #[error("unknown space {space_id}")]
    SpaceNotFound {
        /// The space that was looked up.
        space_id: SpaceId,
    },

    /// Provisioning collided with an existing space.
    #[error("space {space_id} already exists")]
    SpaceExists {
        /// The space that already exists.
        space_id: SpaceId,
    },

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] spacesync_storage::StorageError),

    /// I/O error outside the storage backend (store directory, lock file).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A journal record could not be encoded or decoded.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// The journal holds a damaged record ahead of intact ones, or a
    /// well-formed record that contradicts the state rebuilt so far.
    #[error("journal corruption at offset {offset}: {message}")]
    JournalCorruption {
        /// Offset of the offending record.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// Another process holds the store directory.
    #[error("store locked: another process has exclusive access")]
    StoreLocked,

    /// The space writer lock could not be taken within the configured
    /// timeout because another push holds it.
    #[error("transaction conflict on space {space_id}")]
    TransactionConflict {
        /// The contended space.
        space_id: SpaceId,
    },

    /// The space is at `u64::MAX` and cannot take another commit.
    #[error("space {space_id} has no versions left")]
    VersionExhausted {
        /// The exhausted space.
        space_id: SpaceId,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a space-not-found error.
    pub fn space_not_found(space_id: &SpaceId) -> Self {
        Self::SpaceNotFound {
            space_id: space_id.clone(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a journal corruption error.
    pub fn journal_corruption(offset: u64, message: impl Into<String>) -> Self {
        Self::JournalCorruption {
            offset,
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true if the caller may retry the whole push or pull.
    ///
    /// Nothing of a failed transaction is visible, so a retry starts from
    /// clean state.
    pub fn is_retryable(&self) -> bool {
        match self {
            CoreError::Storage(e) => e.is_transient(),
            CoreError::Io(_) | CoreError::TransactionConflict { .. } => true,
            _ => false,
        }
    }
}

/// Failure reported by a domain mutator.
///
/// The push processor logs it, drops the mutator's writes and still
/// advances the client's last mutation id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct MutatorError {
    message: String,
}

impl MutatorError {
    /// Creates a mutator error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<serde_json::Error> for MutatorError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(format!("invalid mutator arguments: {err}"))
    }
}
