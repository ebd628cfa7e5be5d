//! Error types for cardstore core.

use cardstore_codec::CodecError;
use cardstore_storage::StorageError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in cardstore core operations.
///
/// A missing key is never an error. Reads report it through
/// [`crate::Origin::Missing`].
#[derive(Debug, Error)]
pub enum CoreError {
    /// The backend could not be opened or is marked unhealthy.
    #[error("backend unavailable: {message}")]
    BackendUnavailable {
        /// Description of the failure.
        message: String,
    },

    /// A single backend operation failed.
    #[error("backend operation failed: {message}")]
    OperationFailed {
        /// Description of the failure.
        message: String,
    },

    /// The medium rejected a value as too large.
    #[error("quota exceeded for key {key:?}: {size} bytes, limit {limit}")]
    QuotaExceeded {
        /// The key being written.
        key: String,
        /// Size of the rejected value.
        size: usize,
        /// The limit that was exceeded.
        limit: usize,
    },

    /// A stored value could not be decoded.
    #[error("failed to decode {key:?}: {message}")]
    Decode {
        /// The key whose value was corrupt (empty if unknown).
        key: String,
        /// Description of the problem.
        message: String,
    },

    /// A collection write contained the same record id twice.
    #[error("duplicate record id {id:?} in collection {collection:?}")]
    DuplicateId {
        /// The collection being written.
        collection: String,
        /// The repeated id.
        id: String,
    },

    /// A single record is larger than the configured limit.
    #[error("record {id:?} in collection {collection:?} is {size} bytes, limit {limit}")]
    RecordTooLarge {
        /// The collection being written.
        collection: String,
        /// The record's id, if it has one.
        id: String,
        /// Serialized size in bytes.
        size: usize,
        /// The configured limit.
        limit: usize,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// Migrating a legacy key failed.
    #[error("migration failed at {key:?}: {message}")]
    MigrationFailed {
        /// The legacy key that could not be migrated.
        key: String,
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates a backend unavailable error.
    pub fn backend_unavailable(message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            message: message.into(),
        }
    }

    /// Creates a decode error for `key`.
    pub fn decode(key: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Decode {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a migration failed error.
    pub fn migration_failed(key: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::MigrationFailed {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Returns true if this error means the backend itself misbehaved.
    ///
    /// Only these errors mark the backend unhealthy. A value that is too
    /// large or corrupt says nothing about the medium.
    #[must_use]
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            Self::BackendUnavailable { .. } | Self::OperationFailed { .. }
        )
    }
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Unavailable(_) | StorageError::Closed => Self::BackendUnavailable {
                message: err.to_string(),
            },
            StorageError::QuotaExceeded { key, size, limit } => {
                Self::QuotaExceeded { key, size, limit }
            }
            StorageError::OperationFailed { .. } | StorageError::Io(_) => Self::OperationFailed {
                message: err.to_string(),
            },
        }
    }
}

impl From<CodecError> for CoreError {
    fn from(err: CodecError) -> Self {
        Self::decode(String::new(), err)
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::decode(String::new(), err)
    }
}
