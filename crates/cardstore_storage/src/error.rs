//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
///
/// A missing key is not an error: [`crate::StorageBackend::get`] returns
/// `Ok(None)` for it.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be opened or reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// A single get/put/delete/list operation failed.
    #[error("{op} failed for key {key:?}: {message}")]
    OperationFailed {
        /// The operation that failed.
        op: &'static str,
        /// The key the operation addressed (empty for listing).
        key: String,
        /// Description of the failure.
        message: String,
    },

    /// A value does not fit in the medium's byte budget.
    #[error("quota exceeded for key {key:?}: {size} bytes, limit {limit}")]
    QuotaExceeded {
        /// The key being written.
        key: String,
        /// Size of the rejected value in bytes.
        size: usize,
        /// The limit that was exceeded.
        limit: usize,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The backend has not been opened, or was closed.
    #[error("backend is closed")]
    Closed,
}

impl StorageError {
    /// Creates an operation failure.
    pub fn operation(op: &'static str, key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OperationFailed {
            op,
            key: key.into(),
            message: message.into(),
        }
    }

    /// Returns true if the whole backend is unreachable rather than a
    /// single operation having failed.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_classification() {
        assert!(StorageError::Unavailable("down".into()).is_unavailable());
        assert!(StorageError::Closed.is_unavailable());
        assert!(!StorageError::operation("get", "k", "boom").is_unavailable());
    }

    #[test]
    fn operation_display_names_key() {
        let err = StorageError::operation("put", "decks", "disk full");
        assert_eq!(err.to_string(), "put failed for key \"decks\": disk full");
    }
}
