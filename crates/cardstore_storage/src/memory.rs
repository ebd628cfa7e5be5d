//! In-memory storage backend for testing.

use crate::backend::{BackendKind, StorageBackend};
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// An in-memory storage backend.
///
/// This backend stores all values in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral stores that don't need persistence
///
/// It can play either backend role and can optionally enforce a per-value
/// byte limit, which makes it a stand-in for the legacy store in tests.
///
/// # Example
///
/// ```rust
/// use cardstore_storage::{BackendKind, InMemoryBackend, StorageBackend};
///
/// # tokio_test_block(async {
/// let backend = InMemoryBackend::new(BackendKind::Primary);
/// backend.open().await.unwrap();
/// backend.put("decks", "[]").await.unwrap();
/// assert_eq!(backend.get("decks").await.unwrap().as_deref(), Some("[]"));
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Debug)]
pub struct InMemoryBackend {
    kind: BackendKind,
    data: RwLock<BTreeMap<String, String>>,
    max_value_bytes: Option<usize>,
    opened: AtomicBool,
    open_calls: AtomicUsize,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend playing the given role.
    #[must_use]
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            data: RwLock::new(BTreeMap::new()),
            max_value_bytes: None,
            opened: AtomicBool::new(false),
            open_calls: AtomicUsize::new(0),
        }
    }

    /// Creates a backend that rejects values larger than `limit` bytes.
    #[must_use]
    pub fn with_quota(kind: BackendKind, limit: usize) -> Self {
        Self {
            max_value_bytes: Some(limit),
            ..Self::new(kind)
        }
    }

    /// Creates a backend with pre-existing entries.
    ///
    /// Useful for seeding legacy data in migration tests.
    #[must_use]
    pub fn with_entries<I, K, V>(kind: BackendKind, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let backend = Self::new(kind);
        {
            let mut data = backend.data.write();
            for (key, value) in entries {
                data.insert(key.into(), value.into());
            }
        }
        backend
    }

    /// Returns a copy of all entries.
    #[must_use]
    pub fn entries(&self) -> BTreeMap<String, String> {
        self.data.read().clone()
    }

    /// Reads a raw value without going through `open`.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<String> {
        self.data.read().get(key).cloned()
    }

    /// Writes a raw value without going through `open` or the quota.
    pub fn insert_raw(&self, key: impl Into<String>, value: impl Into<String>) {
        self.data.write().insert(key.into(), value.into());
    }

    /// Number of times `open` has been called.
    #[must_use]
    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    /// Clears all entries.
    pub fn clear(&self) {
        self.data.write().clear();
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.opened.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StorageError::Closed)
        }
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn open(&self) -> StorageResult<()> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        self.opened.store(true, Ordering::Release);
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.ensure_open()?;
        Ok(self.data.read().get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> StorageResult<()> {
        self.ensure_open()?;
        if let Some(limit) = self.max_value_bytes {
            if value.len() > limit {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    size: value.len(),
                    limit,
                });
            }
        }
        self.data.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.ensure_open()?;
        self.data.write().remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> StorageResult<Vec<String>> {
        self.ensure_open()?;
        Ok(self.data.read().keys().cloned().collect())
    }

    fn max_value_bytes(&self) -> Option<usize> {
        self.max_value_bytes
    }
}
