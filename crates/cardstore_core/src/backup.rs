//! Backup mirror of critical keys.
//!
//! After every successful write of a critical key, the engine copies the
//! value into the legacy store under a prefixed key:
//!
//! ```text
//! backup:user          {"id":"u1",...}
//! backup:flashcards    {"segmented":true,...}
//! backup:flashcards#0  [...]
//! ```
//!
//! The copy uses the same layout as the primary store, so a large
//! collection is segmented to fit the legacy store's quota. Mirroring is
//! best-effort: failures are logged and reported as [`MirrorOutcome::Failed`],
//! never returned as errors. The mirror is only read when the primary read
//! fails or finds nothing.

use crate::config::EngineConfig;
use crate::layout;
use cardstore_codec::CompressionPolicy;
use cardstore_storage::StorageBackend;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// What happened to a mirror write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorOutcome {
    /// The copy was written.
    Written,
    /// The key is not critical; nothing was written.
    Skipped,
    /// The write failed and was logged.
    Failed,
}

/// Best-effort secondary copy of critical documents and collections.
pub struct BackupMirror {
    store: Arc<dyn StorageBackend>,
    prefix: String,
    critical: Vec<String>,
    policy: CompressionPolicy,
    segment_capacity: usize,
}

impl std::fmt::Debug for BackupMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupMirror")
            .field("store", &self.store.kind())
            .field("prefix", &self.prefix)
            .field("critical", &self.critical)
            .finish()
    }
}

impl BackupMirror {
    /// Creates a mirror writing into `store`.
    pub fn new(store: Arc<dyn StorageBackend>, config: &EngineConfig) -> Self {
        Self {
            store,
            prefix: config.backup_prefix.clone(),
            critical: config.critical_keys.clone(),
            policy: config.compression,
            segment_capacity: config.segment_capacity,
        }
    }

    /// Returns the key a mirrored copy of `key` is stored under.
    #[must_use]
    pub fn backup_key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    /// Returns true if `key` is mirrored.
    #[must_use]
    pub fn covers(&self, key: &str) -> bool {
        self.critical.iter().any(|k| k == key)
    }

    /// Returns true if `key` belongs to the mirror's namespace.
    #[must_use]
    pub fn owns(&self, key: &str) -> bool {
        key.starts_with(&self.prefix)
    }

    /// Copies a collection if `key` is critical.
    pub async fn mirror_collection(&self, key: &str, records: &[Value]) -> MirrorOutcome {
        if !self.covers(key) {
            return MirrorOutcome::Skipped;
        }
        let backup_key = self.backup_key(key);
        let result = layout::write_collection(
            self.store.as_ref(),
            &backup_key,
            records,
            self.segment_capacity,
            &self.policy,
        )
        .await;
        self.outcome(key, result.map(|_| ()))
    }

    /// Copies a document if `key` is critical.
    pub async fn mirror_document(&self, key: &str, value: &Value) -> MirrorOutcome {
        if !self.covers(key) {
            return MirrorOutcome::Skipped;
        }
        let backup_key = self.backup_key(key);
        let result =
            layout::write_value(self.store.as_ref(), &backup_key, value, &self.policy).await;
        self.outcome(key, result.map(|_| ()))
    }

    /// Removes the copy of `key`, if any.
    pub async fn remove(&self, key: &str) -> MirrorOutcome {
        if !self.covers(key) {
            return MirrorOutcome::Skipped;
        }
        let result = layout::delete_entry(self.store.as_ref(), &self.backup_key(key)).await;
        self.outcome(key, result)
    }

    fn outcome(&self, key: &str, result: crate::CoreResult<()>) -> MirrorOutcome {
        match result {
            Ok(()) => {
                debug!(key, "mirrored");
                MirrorOutcome::Written
            }
            Err(e) => {
                warn!(key, error = %e, "backup mirror write failed");
                MirrorOutcome::Failed
            }
        }
    }

    /// Reads the mirrored copy of a collection.
    ///
    /// Returns `None` if there is no copy or it cannot be read.
    pub async fn recover_collection(&self, key: &str) -> Option<Vec<Value>> {
        if !self.covers(key) {
            return None;
        }
        match layout::read_collection(self.store.as_ref(), &self.backup_key(key)).await {
            Ok(read) => read.map(|r| r.records),
            Err(e) => {
                warn!(key, error = %e, "backup mirror read failed");
                None
            }
        }
    }

    /// Reads the mirrored copy of a document.
    ///
    /// Returns `None` if there is no copy or it cannot be read.
    pub async fn recover_document(&self, key: &str) -> Option<Value> {
        if !self.covers(key) {
            return None;
        }
        match layout::read_value(self.store.as_ref(), &self.backup_key(key)).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "backup mirror read failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardstore_storage::{BackendKind, FaultInjectingBackend, InMemoryBackend};
    use serde_json::json;

    async fn mirror() -> (Arc<FaultInjectingBackend>, BackupMirror) {
        let store = Arc::new(FaultInjectingBackend::new(InMemoryBackend::new(
            BackendKind::Legacy,
        )));
        store.open().await.unwrap();
        let mirror = BackupMirror::new(store.clone(), &EngineConfig::default());
        (store, mirror)
    }

    #[tokio::test]
    async fn critical_document_round_trip() {
        let (store, mirror) = mirror().await;
        let user = json!({ "id": "u1", "name": "Ada" });
        assert_eq!(mirror.mirror_document("user", &user).await, MirrorOutcome::Written);
        assert!(store.get("backup:user").await.unwrap().is_some());
        assert_eq!(mirror.recover_document("user").await, Some(user));
    }

    #[tokio::test]
    async fn non_critical_keys_are_skipped() {
        let (store, mirror) = mirror().await;
        assert_eq!(
            mirror.mirror_collection("shareCodes", &[json!({ "id": "s1" })]).await,
            MirrorOutcome::Skipped
        );
        assert!(store.list_keys().await.unwrap().is_empty());
        assert_eq!(mirror.recover_collection("shareCodes").await, None);
    }

    #[tokio::test]
    async fn large_collections_are_segmented() {
        let (store, mirror) = mirror().await;
        let records: Vec<Value> = (0..25).map(|i| json!({ "id": i })).collect();
        mirror.mirror_collection("flashcards", &records).await;
        assert_eq!(store.list_keys().await.unwrap().len(), 4);
        assert_eq!(mirror.recover_collection("flashcards").await, Some(records));

        assert_eq!(mirror.remove("flashcards").await, MirrorOutcome::Written);
        assert!(store.list_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        let (store, mirror) = mirror().await;
        store.fail_writes(true);
        assert_eq!(
            mirror.mirror_document("session", &json!({ "token": "t" })).await,
            MirrorOutcome::Failed
        );
        store.fail_reads(true);
        assert_eq!(mirror.recover_document("session").await, None);
    }

    #[test]
    fn namespace() {
        let mirror = BackupMirror::new(
            Arc::new(InMemoryBackend::new(BackendKind::Legacy)),
            &EngineConfig::default(),
        );
        assert_eq!(mirror.backup_key("decks"), "backup:decks");
        assert!(mirror.owns("backup:decks#1"));
        assert!(!mirror.owns("decks"));
    }
}
