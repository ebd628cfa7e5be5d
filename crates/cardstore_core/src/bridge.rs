//! Synchronous compatibility bridge.
//!
//! Some call sites need an answer right now and cannot await. The bridge
//! answers them from what is already in memory and schedules the real
//! engine call on the runtime in the background.
//!
//! # Staleness contract
//!
//! **Reads through the bridge may be stale, and writes through the bridge
//! are not visible to an immediately following bridge read.**
//!
//! - A read returns [`Snapshot::Cached`] if the engine cache or the
//!   bridge's own snapshot holds the key, otherwise
//!   [`Snapshot::Placeholder`] with an empty value. Either way a refresh is
//!   scheduled unless one is already running for the key.
//! - The result of a scheduled operation is never delivered to the caller
//!   that triggered it. It only updates what later reads see.
//! - A write returns immediately. Until the background write completes, a
//!   bridge read of the same key may return the old value or a
//!   placeholder. Write errors are logged and otherwise lost.
//! - Nothing in the bridge blocks. [`SyncBridge::settle`] is the only way
//!   to wait for scheduled work, and it is async.
//! - Scheduled work outlives the bridge. Dropping a [`SyncBridge`] detaches
//!   its tasks; they still run to completion on the runtime.
//!
//! Code that needs read-your-writes must use [`StorageEngine`] directly.

use crate::cache::TtlCache;
use crate::engine::{Origin, StorageEngine};
use crate::error::{CoreError, CoreResult};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// An immediate answer from the bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot<T> {
    /// A value previously read from the engine. May be stale.
    Cached(T),
    /// Nothing was in memory; this is an empty stand-in.
    Placeholder(T),
}

impl<T> Snapshot<T> {
    /// Returns true for a stand-in value.
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder(_))
    }

    /// Returns the value either way.
    pub fn into_value(self) -> T {
        match self {
            Self::Cached(value) | Self::Placeholder(value) => value,
        }
    }
}

struct Shared {
    engine: Arc<StorageEngine>,
    /// Last value each refresh produced, including mirror fallbacks the
    /// engine does not cache.
    snapshots: TtlCache,
    inflight: Mutex<HashSet<String>>,
}

/// Clears a key's in-flight mark when its refresh ends, including by panic.
struct InflightGuard {
    shared: Arc<Shared>,
    key: String,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.shared.inflight.lock().remove(&self.key);
    }
}

/// Non-blocking facade over a [`StorageEngine`].
pub struct SyncBridge {
    shared: Arc<Shared>,
    handle: Handle,
    tasks: Mutex<JoinSet<()>>,
}

impl std::fmt::Debug for SyncBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncBridge")
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

impl SyncBridge {
    /// Creates a bridge that schedules work on the current runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if called outside a Tokio runtime.
    pub fn new(engine: Arc<StorageEngine>) -> CoreResult<Self> {
        let handle = Handle::try_current()
            .map_err(|e| CoreError::invalid_operation(format!("no async runtime: {e}")))?;
        Ok(Self::with_handle(engine, handle))
    }

    /// Creates a bridge that schedules work on `handle`.
    pub fn with_handle(engine: Arc<StorageEngine>, handle: Handle) -> Self {
        let ttl = engine.config().cache_ttl;
        Self {
            shared: Arc::new(Shared {
                engine,
                snapshots: TtlCache::new(ttl),
                inflight: Mutex::new(HashSet::new()),
            }),
            handle,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    fn spawn(&self, task: impl Future<Output = ()> + Send + 'static) {
        let mut tasks = self.tasks.lock();
        reap(&mut tasks);
        tasks.spawn_on(task, &self.handle);
    }

    fn cached(&self, key: &str) -> Option<Value> {
        self.shared
            .engine
            .peek(key)
            .or_else(|| self.shared.snapshots.get(key))
    }

    fn refresh(&self, key: &str, collection: bool) {
        if !self.shared.inflight.lock().insert(key.to_string()) {
            return;
        }
        let guard = InflightGuard {
            shared: Arc::clone(&self.shared),
            key: key.to_string(),
        };
        self.spawn(async move {
            let (shared, key) = (&guard.shared, &guard.key);
            let ticket = shared.snapshots.ticket(key);
            let (value, origin) = if collection {
                let fetched = shared.engine.get_collection(key).await;
                (Some(Value::Array(fetched.value)), fetched.origin)
            } else {
                let fetched = shared.engine.get_document(key).await;
                (fetched.value, fetched.origin)
            };
            if origin != Origin::Unavailable {
                match value {
                    Some(value) => {
                        shared.snapshots.fill(key, value, ticket);
                    }
                    None => shared.snapshots.invalidate(key),
                }
            }
            debug!(key = %key, %origin, "bridge refresh finished");
        });
    }

    /// Returns the collection `name` as currently known.
    pub fn collection(&self, name: &str) -> Snapshot<Vec<Value>> {
        let snapshot = match self.cached(name) {
            Some(Value::Array(records)) => Snapshot::Cached(records),
            _ => Snapshot::Placeholder(Vec::new()),
        };
        self.refresh(name, true);
        snapshot
    }

    /// Returns the document at `key` as currently known.
    pub fn document(&self, key: &str) -> Snapshot<Option<Value>> {
        let snapshot = match self.cached(key) {
            Some(value) => Snapshot::Cached(Some(value)),
            None => Snapshot::Placeholder(None),
        };
        self.refresh(key, false);
        snapshot
    }

    /// Schedules a collection write.
    pub fn put_collection(&self, name: &str, records: Vec<Value>) {
        self.shared.snapshots.invalidate(name);
        let engine = Arc::clone(&self.shared.engine);
        let name = name.to_string();
        self.spawn(async move {
            if let Err(e) = engine.put_collection(&name, records).await {
                warn!(key = name, error = %e, "background collection write failed");
            }
        });
    }

    /// Schedules a document write.
    pub fn put_document(&self, key: &str, value: Value) {
        self.shared.snapshots.invalidate(key);
        let engine = Arc::clone(&self.shared.engine);
        let key = key.to_string();
        self.spawn(async move {
            if let Err(e) = engine.put_document(&key, value).await {
                warn!(key, error = %e, "background document write failed");
            }
        });
    }

    /// Schedules a delete.
    pub fn delete_key(&self, key: &str) {
        self.shared.snapshots.invalidate(key);
        let engine = Arc::clone(&self.shared.engine);
        let key = key.to_string();
        self.spawn(async move {
            if let Err(e) = engine.delete_key(&key).await {
                warn!(key, error = %e, "background delete failed");
            }
        });
    }

    /// Number of scheduled operations that have not finished.
    pub fn pending(&self) -> usize {
        let mut tasks = self.tasks.lock();
        reap(&mut tasks);
        tasks.len()
    }

    /// Waits for every scheduled operation, including ones scheduled while
    /// waiting. Returns how many it waited for.
    pub async fn settle(&self) -> usize {
        let mut finished = 0;
        loop {
            let mut batch = Detached(std::mem::take(&mut *self.tasks.lock()));
            if batch.0.is_empty() {
                return finished;
            }
            while let Some(result) = batch.0.join_next().await {
                if let Err(e) = result {
                    warn!(error = %e, "bridge task panicked");
                }
                finished += 1;
            }
        }
    }
}

/// A set of bridge tasks that keep running if the set is dropped.
struct Detached(JoinSet<()>);

impl Drop for Detached {
    fn drop(&mut self) {
        self.0.detach_all();
    }
}

impl Drop for SyncBridge {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut();
        reap(tasks);
        if !tasks.is_empty() {
            debug!(pending = tasks.len(), "bridge dropped, scheduled work continues");
        }
        tasks.detach_all();
    }
}

/// Collects finished tasks without waiting.
fn reap(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.try_join_next() {
        if let Err(e) = result {
            warn!(error = %e, "bridge task panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use cardstore_storage::{BackendKind, FaultInjectingBackend, InMemoryBackend};
    use serde_json::json;

    fn engine() -> (Arc<FaultInjectingBackend>, Arc<StorageEngine>) {
        let primary = Arc::new(FaultInjectingBackend::new(InMemoryBackend::new(
            BackendKind::Primary,
        )));
        let legacy = Arc::new(InMemoryBackend::new(BackendKind::Legacy));
        let engine = StorageEngine::new(primary.clone(), legacy, EngineConfig::default());
        (primary, Arc::new(engine))
    }

    #[tokio::test]
    async fn first_read_is_a_placeholder() {
        let (_, engine) = engine();
        engine.put_collection("decks", vec![json!({ "id": "d1" })]).await.unwrap();
        let bridge = SyncBridge::new(engine).unwrap();

        let snapshot = bridge.collection("decks");
        assert_eq!(snapshot, Snapshot::Placeholder(vec![]));

        bridge.settle().await;
        assert_eq!(
            bridge.collection("decks"),
            Snapshot::Cached(vec![json!({ "id": "d1" })])
        );
    }

    #[tokio::test]
    async fn write_is_not_immediately_visible() {
        let (_, engine) = engine();
        let bridge = SyncBridge::new(Arc::clone(&engine)).unwrap();

        bridge.put_document("user", json!({ "id": "u1" }));
        assert!(bridge.document("user").is_placeholder());

        bridge.settle().await;
        assert_eq!(
            engine.get_document("user").await.value,
            Some(json!({ "id": "u1" }))
        );
        // The refresh scheduled by the read above may have run before the
        // write; one more round observes it.
        bridge.document("user");
        bridge.settle().await;
        assert_eq!(
            bridge.document("user"),
            Snapshot::Cached(Some(json!({ "id": "u1" })))
        );
    }

    #[tokio::test]
    async fn refreshes_are_deduplicated() {
        let (_, engine) = engine();
        let bridge = SyncBridge::new(engine).unwrap();
        bridge.collection("themes");
        bridge.collection("themes");
        bridge.collection("themes");
        assert_eq!(bridge.pending(), 1);
        assert_eq!(bridge.settle().await, 1);
        assert_eq!(bridge.pending(), 0);
    }

    #[tokio::test]
    async fn mirror_fallbacks_are_remembered() {
        let (primary, engine) = engine();
        engine.put_document("user", json!({ "id": "u1" })).await.unwrap();
        primary.fail_reads(true);

        let bridge = SyncBridge::new(engine).unwrap();
        bridge.document("user");
        bridge.settle().await;
        assert_eq!(
            bridge.document("user"),
            Snapshot::Cached(Some(json!({ "id": "u1" })))
        );
    }

    #[tokio::test]
    async fn failed_writes_are_swallowed() {
        let (primary, engine) = engine();
        engine.init().await;
        primary.fail_writes(true);
        let bridge = SyncBridge::new(Arc::clone(&engine)).unwrap();
        bridge.put_collection("decks", vec![json!({ "id": "d1" })]);
        assert_eq!(bridge.settle().await, 1);
        assert!(!engine.is_healthy());
    }

    #[test]
    fn requires_a_runtime() {
        let (_, engine) = engine();
        assert!(SyncBridge::new(engine).is_err());
    }

    #[tokio::test]
    async fn dropping_the_bridge_keeps_scheduled_writes() {
        let (_, engine) = engine();
        {
            let bridge = SyncBridge::new(Arc::clone(&engine)).unwrap();
            bridge.put_document("user", json!({ "id": "u1" }));
            bridge.put_collection("decks", vec![json!({ "id": "d1" })]);
        }
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
        assert_eq!(
            engine.get_document("user").await.value,
            Some(json!({ "id": "u1" }))
        );
        assert_eq!(engine.get_collection("decks").await.value.len(), 1);
    }

    #[tokio::test]
    async fn finished_tasks_are_reaped() {
        let (_, engine) = engine();
        let bridge = SyncBridge::new(engine).unwrap();
        for i in 0..200 {
            bridge.document(&format!("k{i}"));
            tokio::task::yield_now().await;
        }
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
        assert_eq!(bridge.pending(), 0);
    }

    #[tokio::test]
    async fn panicked_refresh_releases_its_key() {
        let (_, engine) = engine();
        let bridge = SyncBridge::new(engine).unwrap();
        let guard = InflightGuard {
            shared: Arc::clone(&bridge.shared),
            key: "decks".to_string(),
        };
        bridge.shared.inflight.lock().insert("decks".to_string());
        let task = tokio::spawn(async move {
            let _guard = guard;
            panic!("refresh failed");
        });
        assert!(task.await.is_err());
        assert!(bridge.shared.inflight.lock().is_empty());

        bridge.collection("decks");
        assert_eq!(bridge.pending(), 1);
    }
}
