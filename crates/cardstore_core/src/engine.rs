//! The storage engine facade.
//!
//! [`StorageEngine`] is the only surface the domain layer calls. It owns
//! the backends, the read cache, the backup mirror, the migration state and
//! the health flag. Construct one per process, wrap it in an `Arc`, and
//! hand clones to repositories.
//!
//! ## Read path
//!
//! ```text
//! cache ──hit──► Origin::Cache
//!   │ miss
//!   ▼
//! backend ──ok──► Origin::Backend (cache filled)
//!   │ missing / failed / undecodable
//!   ▼
//! mirror ──found──► Origin::Mirror (key queued for repair)
//!   │
//!   ▼
//! default ──► Origin::Missing (nothing anywhere) or Origin::Unavailable
//! ```
//!
//! ## Write path
//!
//! Validate, invalidate the cache, write through the layout codecs,
//! invalidate again, then mirror critical keys. A session running degraded
//! on the legacy store writes no mirror copies. The first backend failure
//! marks the backend unhealthy; later writes fail fast with
//! [`CoreError::BackendUnavailable`] and later reads go straight to the
//! mirror until [`StorageEngine::reconnect`] succeeds.

use crate::backup::BackupMirror;
use crate::cache::TtlCache;
use crate::config::{EngineConfig, EntryKind};
use crate::error::{CoreError, CoreResult};
use crate::layout;
use crate::migration::{MigrationManager, MigrationReport, MigrationState};
use crate::stats::{EngineStats, StatsSnapshot};
use cardstore_codec::{classify, parse_segment_key, StoredCollection};
use cardstore_storage::{BackendKind, StorageBackend};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};

/// Where a read's value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// The read cache.
    Cache,
    /// The active backend.
    Backend,
    /// The backup mirror, because the backend failed or had nothing.
    Mirror,
    /// Nothing is stored anywhere; the value is the empty default.
    Missing,
    /// The backend failed and the mirror had nothing; the value is the
    /// empty default and says nothing about what is stored.
    Unavailable,
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Cache => "cache",
            Self::Backend => "backend",
            Self::Mirror => "mirror",
            Self::Missing => "missing",
            Self::Unavailable => "unavailable",
        })
    }
}

/// A read result together with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    /// The value read, or the empty default.
    pub value: T,
    /// Where the value came from.
    pub origin: Origin,
}

impl<T> Fetched<T> {
    fn new(value: T, origin: Origin) -> Self {
        Self { value, origin }
    }

    /// Returns true if the value did not come from the cache or backend.
    ///
    /// `Missing` is not degraded: the backend answered that nothing is
    /// stored.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        matches!(self.origin, Origin::Mirror | Origin::Unavailable)
    }

    /// Returns true if the value is a default standing in for unknown data.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.origin == Origin::Unavailable
    }

    /// Maps the value, keeping the origin.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        Fetched {
            value: f(self.value),
            origin: self.origin,
        }
    }

    /// Returns the value, discarding the origin.
    pub fn into_value(self) -> T {
        self.value
    }
}

/// What engine startup found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitReport {
    /// The backend facade calls go to for this session.
    pub active: BackendKind,
    /// True if the primary store could not be opened.
    pub degraded: bool,
    /// Why the primary store could not be opened.
    pub primary_error: Option<String>,
    /// Whether the legacy store (and with it the mirror) is reachable.
    pub legacy_available: bool,
    /// The migration pass run at startup, if the primary store opened.
    pub migration: Option<MigrationReport>,
}

/// Keys removed by an orphan sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Segment keys removed from the active store.
    pub active: Vec<String>,
    /// Segment keys removed from the mirror's store.
    pub mirror: Vec<String>,
}

impl SweepReport {
    /// Total keys removed.
    #[must_use]
    pub fn total(&self) -> usize {
        self.active.len() + self.mirror.len()
    }
}

/// The storage engine.
pub struct StorageEngine {
    config: EngineConfig,
    primary: Arc<dyn StorageBackend>,
    legacy: Arc<dyn StorageBackend>,
    init: OnceCell<InitReport>,
    healthy: AtomicBool,
    cache: TtlCache,
    mirror: BackupMirror,
    migration: MigrationManager,
    /// Keys served from the mirror that the backend may lack.
    pending_repairs: Mutex<BTreeMap<String, EntryKind>>,
    /// Shared by writes, exclusive for sweeps.
    write_gate: RwLock<()>,
    stats: EngineStats,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("init", &self.init.get())
            .field("healthy", &self.healthy.load(Ordering::SeqCst))
            .field("mirror", &self.mirror)
            .finish_non_exhaustive()
    }
}

impl StorageEngine {
    /// Creates an engine. Nothing is opened until the first call.
    ///
    /// The backup mirror lives in `legacy`.
    pub fn new(
        primary: Arc<dyn StorageBackend>,
        legacy: Arc<dyn StorageBackend>,
        config: EngineConfig,
    ) -> Self {
        let mirror = BackupMirror::new(Arc::clone(&legacy), &config);
        Self {
            cache: TtlCache::new(config.cache_ttl),
            mirror,
            primary,
            legacy,
            init: OnceCell::new(),
            healthy: AtomicBool::new(false),
            migration: MigrationManager::new(),
            pending_repairs: Mutex::new(BTreeMap::new()),
            write_gate: RwLock::new(()),
            stats: EngineStats::new(),
            config,
        }
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Opens the backends and runs migration, once.
    ///
    /// Concurrent and repeated calls share the first call's outcome. Every
    /// facade operation awaits this first, so calling it explicitly is only
    /// needed to inspect the report.
    pub async fn init(&self) -> InitReport {
        self.ready().await.clone()
    }

    async fn ready(&self) -> &InitReport {
        self.init.get_or_init(|| self.detect()).await
    }

    async fn detect(&self) -> InitReport {
        let legacy_available = match self.legacy.open().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "legacy store unavailable, backup mirror disabled");
                false
            }
        };

        match self.primary.open().await {
            Ok(()) => {
                self.healthy.store(true, Ordering::SeqCst);
                let migration = self
                    .migration
                    .run(
                        self.legacy.as_ref(),
                        self.primary.as_ref(),
                        &self.config,
                        legacy_available.then_some(&self.mirror),
                    )
                    .await;
                info!(migrated = migration.is_completed(), "storage engine ready");
                InitReport {
                    active: BackendKind::Primary,
                    degraded: false,
                    primary_error: None,
                    legacy_available,
                    migration: Some(migration),
                }
            }
            Err(e) => {
                warn!(error = %e, "primary store unavailable, running degraded on legacy store");
                self.healthy.store(legacy_available, Ordering::SeqCst);
                InitReport {
                    active: BackendKind::Legacy,
                    degraded: true,
                    primary_error: Some(e.to_string()),
                    legacy_available,
                    migration: None,
                }
            }
        }
    }

    fn store(&self, report: &InitReport) -> &dyn StorageBackend {
        match report.active {
            BackendKind::Primary => self.primary.as_ref(),
            BackendKind::Legacy => self.legacy.as_ref(),
        }
    }

    /// Returns true if reads may be served from the mirror or defaults.
    pub fn is_degraded(&self) -> bool {
        let init_degraded = self.init.get().map_or(false, |r| r.degraded);
        init_degraded || !self.healthy.load(Ordering::SeqCst)
    }

    /// Returns true if the active backend is considered healthy.
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    /// Returns the migration state.
    pub fn migration_state(&self) -> MigrationState {
        self.migration.state()
    }

    /// Returns a snapshot of the engine counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Returns the keys waiting to be re-written from the mirror.
    pub fn pending_repairs(&self) -> Vec<String> {
        self.pending_repairs.lock().keys().cloned().collect()
    }

    /// Returns the cached value for `key` without touching the backend.
    pub fn peek(&self, key: &str) -> Option<Value> {
        self.cache.get(key)
    }

    fn note_failure(&self, key: &str, err: &CoreError) {
        if !err.is_backend_failure() {
            return;
        }
        self.stats.record_backend_error();
        if self.healthy.swap(false, Ordering::SeqCst) {
            warn!(key, error = %err, "backend marked unhealthy");
        }
    }

    fn queue_repair(&self, key: &str, kind: EntryKind) {
        self.pending_repairs.lock().insert(key.to_string(), kind);
    }

    fn fall_back<T>(&self, key: &str, recovered: Option<T>, default: T, reason: &str) -> Fetched<T> {
        self.stats.record_fallback();
        match recovered {
            Some(value) => {
                warn!(key, reason, "serving backup copy");
                Fetched::new(value, Origin::Mirror)
            }
            None => {
                warn!(key, reason, "no backup copy, serving empty default");
                Fetched::new(default, Origin::Unavailable)
            }
        }
    }

    /// Reads a collection.
    ///
    /// Never fails. If the backend cannot answer, the mirrored copy or an
    /// empty list is returned and [`Fetched::origin`] says which.
    pub async fn get_collection(&self, name: &str) -> Fetched<Vec<Value>> {
        let report = self.ready().await;
        self.stats.record_read();

        if let Some(Value::Array(records)) = self.cache.get(name) {
            self.stats.record_cache_hit();
            return Fetched::new(records, Origin::Cache);
        }
        self.stats.record_cache_miss();

        if !self.is_healthy() {
            let recovered = self.mirror.recover_collection(name).await;
            if recovered.is_some() {
                self.queue_repair(name, EntryKind::Collection);
            }
            return self.fall_back(name, recovered, Vec::new(), "backend unhealthy");
        }

        let ticket = self.cache.ticket(name);
        match layout::read_collection(self.store(report), name).await {
            Ok(Some(read)) => {
                self.cache
                    .fill(name, Value::Array(read.records.clone()), ticket);
                Fetched::new(read.records, Origin::Backend)
            }
            Ok(None) => match self.mirror.recover_collection(name).await {
                Some(records) => {
                    self.queue_repair(name, EntryKind::Collection);
                    self.fall_back(name, Some(records), Vec::new(), "missing from backend")
                }
                None => Fetched::new(Vec::new(), Origin::Missing),
            },
            Err(e) => {
                self.cache.invalidate(name);
                self.note_failure(name, &e);
                let recovered = self.mirror.recover_collection(name).await;
                if recovered.is_some() {
                    self.queue_repair(name, EntryKind::Collection);
                }
                self.fall_back(name, recovered, Vec::new(), &e.to_string())
            }
        }
    }

    /// Reads a document.
    ///
    /// Never fails. A `None` value with [`Origin::Missing`] means nothing
    /// is stored; with [`Origin::Unavailable`] it means the engine could
    /// not find out.
    pub async fn get_document(&self, key: &str) -> Fetched<Option<Value>> {
        let report = self.ready().await;
        self.stats.record_read();

        if let Some(value) = self.cache.get(key) {
            self.stats.record_cache_hit();
            return Fetched::new(Some(value), Origin::Cache);
        }
        self.stats.record_cache_miss();

        if !self.is_healthy() {
            let recovered = self.mirror.recover_document(key).await;
            if recovered.is_some() {
                self.queue_repair(key, EntryKind::Document);
            }
            return self.fall_back(key, recovered.map(Some), None, "backend unhealthy");
        }

        let ticket = self.cache.ticket(key);
        match layout::read_value(self.store(report), key).await {
            Ok(Some(value)) => {
                self.cache.fill(key, value.clone(), ticket);
                Fetched::new(Some(value), Origin::Backend)
            }
            Ok(None) => match self.mirror.recover_document(key).await {
                Some(value) => {
                    self.queue_repair(key, EntryKind::Document);
                    self.fall_back(key, Some(Some(value)), None, "missing from backend")
                }
                None => Fetched::new(None, Origin::Missing),
            },
            Err(e) => {
                self.cache.invalidate(key);
                self.note_failure(key, &e);
                let recovered = self.mirror.recover_document(key).await;
                if recovered.is_some() {
                    self.queue_repair(key, EntryKind::Document);
                }
                self.fall_back(key, recovered.map(Some), None, &e.to_string())
            }
        }
    }

    fn check_key(key: &str) -> CoreResult<()> {
        if parse_segment_key(key).is_some() {
            return Err(CoreError::invalid_operation(format!(
                "{key} has the form of a segment key"
            )));
        }
        Ok(())
    }

    fn validate_records(&self, name: &str, records: &[Value]) -> CoreResult<()> {
        let mut seen = HashSet::with_capacity(records.len());
        for record in records {
            let id = record.get("id").map(id_text);
            let size = serde_json::to_vec(record)?.len();
            if size > self.config.max_record_bytes {
                return Err(CoreError::RecordTooLarge {
                    collection: name.to_string(),
                    id: id.unwrap_or_default(),
                    size,
                    limit: self.config.max_record_bytes,
                });
            }
            if let Some(id) = id {
                if !seen.insert(id.clone()) {
                    return Err(CoreError::DuplicateId {
                        collection: name.to_string(),
                        id,
                    });
                }
            }
        }
        Ok(())
    }

    fn writable(&self, key: &str) -> CoreResult<()> {
        if self.is_healthy() {
            Ok(())
        } else {
            debug!(key, "write rejected, backend unhealthy");
            Err(CoreError::backend_unavailable("backend is marked unhealthy"))
        }
    }

    /// Replaces the whole collection `name` with `records`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DuplicateId`] or [`CoreError::RecordTooLarge`]
    /// for invalid input, [`CoreError::InvalidOperation`] if `name` looks
    /// like a segment key (`<key>#<n>`), [`CoreError::BackendUnavailable`] if the backend
    /// is unhealthy, and the backend's error if the write fails. Mirror
    /// failures are never returned.
    pub async fn put_collection(&self, name: &str, records: Vec<Value>) -> CoreResult<()> {
        Self::check_key(name)?;
        let report = self.ready().await;
        self.validate_records(name, &records)?;
        self.cache.invalidate(name);
        self.writable(name)?;

        let _gate = self.write_gate.read().await;
        let result = layout::write_collection(
            self.store(report),
            name,
            &records,
            self.config.segment_capacity,
            &self.config.compression,
        )
        .await;
        self.cache.invalidate(name);

        match result {
            Ok(summary) => {
                self.stats.record_write(summary.bytes as u64);
                self.pending_repairs.lock().remove(name);
                if report.active == BackendKind::Primary {
                    let outcome = self.mirror.mirror_collection(name, &records).await;
                    self.stats.record_mirror(outcome);
                }
                Ok(())
            }
            Err(e) => {
                self.note_failure(name, &e);
                Err(e)
            }
        }
    }

    /// Replaces the document at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::RecordTooLarge`] if the value exceeds the
    /// configured limit, [`CoreError::InvalidOperation`] if `key` looks
    /// like a segment key, [`CoreError::BackendUnavailable`] if the backend
    /// is unhealthy, and the backend's error if the write fails.
    pub async fn put_document(&self, key: &str, value: Value) -> CoreResult<()> {
        Self::check_key(key)?;
        let report = self.ready().await;
        let size = serde_json::to_vec(&value)?.len();
        if size > self.config.max_record_bytes {
            return Err(CoreError::RecordTooLarge {
                collection: key.to_string(),
                id: value.get("id").map(id_text).unwrap_or_default(),
                size,
                limit: self.config.max_record_bytes,
            });
        }
        self.cache.invalidate(key);
        self.writable(key)?;

        let _gate = self.write_gate.read().await;
        let result =
            layout::write_value(self.store(report), key, &value, &self.config.compression).await;
        self.cache.invalidate(key);

        match result {
            Ok(bytes) => {
                self.stats.record_write(bytes as u64);
                self.pending_repairs.lock().remove(key);
                if report.active == BackendKind::Primary {
                    let outcome = self.mirror.mirror_document(key, &value).await;
                    self.stats.record_mirror(outcome);
                }
                Ok(())
            }
            Err(e) => {
                self.note_failure(key, &e);
                Err(e)
            }
        }
    }

    /// Deletes `key`, its segments and its mirrored copy.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::BackendUnavailable`] if the backend is
    /// unhealthy, and the backend's error if the delete fails.
    pub async fn delete_key(&self, key: &str) -> CoreResult<()> {
        let report = self.ready().await;
        self.cache.invalidate(key);
        self.writable(key)?;

        let _gate = self.write_gate.read().await;
        let result = layout::delete_entry(self.store(report), key).await;
        self.cache.invalidate(key);

        match result {
            Ok(()) => {
                self.stats.record_delete();
                self.pending_repairs.lock().remove(key);
                // A deleted session must not come back from the mirror.
                self.mirror.remove(key).await;
                Ok(())
            }
            Err(e) => {
                self.note_failure(key, &e);
                Err(e)
            }
        }
    }

    /// Re-opens the active backend and replays pending repairs.
    ///
    /// The backend chosen at startup stays the active one; a session that
    /// started degraded keeps running on the legacy store. Returns whether
    /// the backend is healthy afterwards.
    pub async fn reconnect(&self) -> bool {
        let report = self.ready().await;
        let store = self.store(report);

        if !self.is_healthy() {
            match store.open().await {
                Ok(()) => {
                    if !self.healthy.swap(true, Ordering::SeqCst) {
                        info!(kind = %store.kind(), "backend healthy again");
                    }
                }
                Err(e) => {
                    debug!(error = %e, "reconnect failed");
                    return false;
                }
            }
        }

        let pending: Vec<(String, EntryKind)> = std::mem::take(&mut *self.pending_repairs.lock())
            .into_iter()
            .collect();
        for (key, kind) in pending {
            if let Err(e) = self.repair(store, &key, kind).await {
                warn!(key, error = %e, "repair from backup failed");
                self.note_failure(&key, &e);
                self.queue_repair(&key, kind);
                if !self.is_healthy() {
                    return false;
                }
            }
        }
        true
    }

    /// Re-writes the mirrored copy of `key` unless the backend has a value.
    async fn repair(&self, store: &dyn StorageBackend, key: &str, kind: EntryKind) -> CoreResult<()> {
        let _gate = self.write_gate.read().await;
        if layout::read_value(store, key).await?.is_some() {
            debug!(key, "backend has a value, repair skipped");
            return Ok(());
        }
        match kind {
            EntryKind::Collection => {
                if let Some(records) = self.mirror.recover_collection(key).await {
                    layout::write_collection(
                        store,
                        key,
                        &records,
                        self.config.segment_capacity,
                        &self.config.compression,
                    )
                    .await?;
                    self.stats.record_repair();
                }
            }
            EntryKind::Document => {
                if let Some(value) = self.mirror.recover_document(key).await {
                    layout::write_value(store, key, &value, &self.config.compression).await?;
                    self.stats.record_repair();
                }
            }
        }
        self.cache.invalidate(key);
        info!(key, "restored from backup");
        Ok(())
    }

    /// Removes orphaned segments from the active store and the mirror.
    ///
    /// Waits for in-flight writes to finish and holds further writes until
    /// done.
    ///
    /// # Errors
    ///
    /// Returns an error if the active store fails. Mirror failures are
    /// logged only.
    pub async fn sweep_orphans(&self) -> CoreResult<SweepReport> {
        let report = self.ready().await;
        let _gate = self.write_gate.write().await;
        let mut sweep = SweepReport::default();

        if self.is_healthy() {
            sweep.active = layout::sweep_orphans(self.store(report)).await.map_err(|e| {
                self.note_failure("", &e);
                e
            })?;
        }
        if report.legacy_available && report.active != BackendKind::Legacy {
            match layout::sweep_orphans(self.legacy.as_ref()).await {
                Ok(removed) => sweep.mirror = removed,
                Err(e) => warn!(error = %e, "mirror sweep failed"),
            }
        }
        Ok(sweep)
    }

    /// Reads every collection and document in the active store.
    ///
    /// Segment keys, the migration flag and mirror entries are left out.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or an entry cannot be decoded.
    pub async fn export(&self) -> CoreResult<BTreeMap<String, Value>> {
        let report = self.ready().await;
        let store = self.store(report);
        let mut out = BTreeMap::new();
        for key in layout::logical_keys(store).await? {
            if key == self.config.migration_flag_key || self.mirror.owns(&key) {
                continue;
            }
            let Some(value) = layout::read_value(store, &key).await? else {
                continue;
            };
            let value = match classify(value.clone()) {
                Ok(StoredCollection::Segmented(_)) => {
                    let read = layout::read_collection(store, &key).await?;
                    Value::Array(read.map(|r| r.records).unwrap_or_default())
                }
                _ => value,
            };
            out.insert(key, value);
        }
        Ok(out)
    }
}

fn id_text(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
