//! Backend strategy trait definition.

use crate::error::StorageResult;
use async_trait::async_trait;

/// Which role a backend plays for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// The primary structured store.
    Primary,
    /// The legacy flat store with a small quota. Also hosts backup entries.
    Legacy,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Legacy => f.write_str("legacy"),
        }
    }
}

/// A string-keyed, string-valued storage backend.
///
/// Backends are **opaque value stores**. They do not interpret the text they
/// hold: segmentation, compression tags and JSON all belong to the layers
/// above.
///
/// # Invariants
///
/// - `open` is idempotent and memoized; concurrent callers share one attempt
/// - `put` replaces the entire value at a key
/// - `get` of an absent key returns `Ok(None)`, never an error
/// - `delete` of an absent key succeeds
/// - Backends must be `Send + Sync`; every operation is a suspension point
///
/// # Implementors
///
/// - [`super::FileBackend`] - primary structured store on disk
/// - [`super::FlatFileBackend`] - legacy flat store with byte quotas
/// - [`super::InMemoryBackend`] - for testing and ephemeral use
/// - [`super::FaultInjectingBackend`] - wrapper that forces failures
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Returns the role this backend plays.
    fn kind(&self) -> BackendKind;

    /// Opens the backend.
    ///
    /// Calling this more than once is cheap: a successful open is remembered.
    /// A failed open is not, so a later call retries.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::Unavailable`] if the medium cannot be
    /// reached.
    async fn open(&self) -> StorageResult<()>;

    /// Reads the value stored at `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unavailable or the read fails.
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Stores `value` at `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unavailable, the write fails, or
    /// the value exceeds the backend's quota.
    async fn put(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Removes `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unavailable or the delete fails.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Lists every key currently stored, in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unavailable or listing fails.
    async fn list_keys(&self) -> StorageResult<Vec<String>>;

    /// Maximum size of a single value in bytes, if the medium enforces one.
    fn max_value_bytes(&self) -> Option<usize> {
        None
    }
}
