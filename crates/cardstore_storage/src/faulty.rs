//! Fault-injecting backend wrapper.
//!
//! Wraps any backend and fails selected operations on demand. Used to drive
//! the engine's fallback paths: an `open` that cannot connect, reads or
//! writes that fail after the backend was healthy, and so on.

use crate::backend::{BackendKind, StorageBackend};
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// A backend wrapper whose operations can be made to fail at runtime.
///
/// Switches are atomics, so a test can hold an `Arc` to the wrapper, hand a
/// clone to the engine, and flip failures while the engine is running.
///
/// # Example
///
/// ```ignore
/// let primary = Arc::new(FaultInjectingBackend::new(InMemoryBackend::new(BackendKind::Primary)));
/// primary.fail_open(true);
/// // engine.init() now reports the primary as unavailable
/// ```
pub struct FaultInjectingBackend {
    inner: Arc<dyn StorageBackend>,
    fail_open: AtomicBool,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    calls: AtomicUsize,
}

impl FaultInjectingBackend {
    /// Wraps `inner` with every switch off.
    pub fn new(inner: impl StorageBackend + 'static) -> Self {
        Self::wrap(Arc::new(inner))
    }

    /// Wraps an already shared backend.
    pub fn wrap(inner: Arc<dyn StorageBackend>) -> Self {
        Self {
            inner,
            fail_open: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    /// Makes `open` fail with [`StorageError::Unavailable`].
    pub fn fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Makes `get` and `list_keys` fail.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Makes `put` and `delete` fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Turns every failure mode on or off at once.
    pub fn fail_all(&self, fail: bool) {
        self.fail_open(fail);
        self.fail_reads(fail);
        self.fail_writes(fail);
    }

    /// Number of operations (including `open`) that reached this wrapper.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns the wrapped backend.
    #[must_use]
    pub fn inner(&self) -> &Arc<dyn StorageBackend> {
        &self.inner
    }

    fn check(&self, switch: &AtomicBool, op: &'static str, key: &str) -> StorageResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if switch.load(Ordering::SeqCst) {
            Err(StorageError::operation(op, key, "injected failure"))
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for FaultInjectingBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultInjectingBackend")
            .field("kind", &self.inner.kind())
            .field("fail_open", &self.fail_open.load(Ordering::SeqCst))
            .field("fail_reads", &self.fail_reads.load(Ordering::SeqCst))
            .field("fail_writes", &self.fail_writes.load(Ordering::SeqCst))
            .finish()
    }
}

#[async_trait]
impl StorageBackend for FaultInjectingBackend {
    fn kind(&self) -> BackendKind {
        self.inner.kind()
    }

    async fn open(&self) -> StorageResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("injected open failure".into()));
        }
        self.inner.open().await
    }

    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.check(&self.fail_reads, "get", key)?;
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &str) -> StorageResult<()> {
        self.check(&self.fail_writes, "put", key)?;
        self.inner.put(key, value).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.check(&self.fail_writes, "delete", key)?;
        self.inner.delete(key).await
    }

    async fn list_keys(&self) -> StorageResult<Vec<String>> {
        self.check(&self.fail_reads, "list", "")?;
        self.inner.list_keys().await
    }

    fn max_value_bytes(&self) -> Option<usize> {
        self.inner.max_value_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryBackend;

    #[tokio::test]
    async fn passes_through_when_healthy() {
        let backend = FaultInjectingBackend::new(InMemoryBackend::new(BackendKind::Primary));
        backend.open().await.unwrap();
        backend.put("k", "v").await.unwrap();
        assert_eq!(backend.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn open_failure_is_unavailable() {
        let backend = FaultInjectingBackend::new(InMemoryBackend::new(BackendKind::Primary));
        backend.fail_open(true);
        let err = backend.open().await.unwrap_err();
        assert!(err.is_unavailable());

        backend.fail_open(false);
        backend.open().await.unwrap();
    }

    #[tokio::test]
    async fn read_and_write_switches_are_independent() {
        let backend = FaultInjectingBackend::new(InMemoryBackend::new(BackendKind::Legacy));
        backend.open().await.unwrap();
        backend.put("k", "v").await.unwrap();

        backend.fail_writes(true);
        assert!(matches!(
            backend.put("k", "w").await,
            Err(StorageError::OperationFailed { op: "put", .. })
        ));
        assert_eq!(backend.get("k").await.unwrap().as_deref(), Some("v"));

        backend.fail_writes(false);
        backend.fail_reads(true);
        assert!(backend.get("k").await.is_err());
        assert!(backend.list_keys().await.is_err());
        backend.delete("k").await.unwrap();
    }
}
