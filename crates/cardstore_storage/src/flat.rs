//! Legacy flat store.

use crate::backend::{BackendKind, StorageBackend};
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

/// Default per-value limit (the flat medium's per-key budget).
pub const DEFAULT_VALUE_QUOTA: usize = 2 * 1024 * 1024;
/// Default aggregate limit across all keys.
pub const DEFAULT_TOTAL_QUOTA: usize = 5 * 1024 * 1024;

/// The legacy flat store: one string map held in memory and persisted as a
/// single JSON object file.
///
/// Like the browser storage it models, it enforces a small byte budget per
/// value and in aggregate. Sizes count key and value bytes. Values that do
/// not fit are rejected with [`StorageError::QuotaExceeded`] and nothing is
/// written.
///
/// Without a path the store lives only in memory.
#[derive(Debug)]
pub struct FlatFileBackend {
    path: Option<PathBuf>,
    value_quota: usize,
    total_quota: usize,
    data: RwLock<BTreeMap<String, String>>,
    loaded: OnceCell<()>,
    write_gate: Mutex<()>,
}

impl FlatFileBackend {
    /// Creates a flat store persisted at `path` with the default quotas.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::build(Some(path.into()))
    }

    /// Creates a flat store that is never persisted.
    #[must_use]
    pub fn ephemeral() -> Self {
        Self::build(None)
    }

    fn build(path: Option<PathBuf>) -> Self {
        Self {
            path,
            value_quota: DEFAULT_VALUE_QUOTA,
            total_quota: DEFAULT_TOTAL_QUOTA,
            data: RwLock::new(BTreeMap::new()),
            loaded: OnceCell::new(),
            write_gate: Mutex::new(()),
        }
    }

    /// Sets the per-value and aggregate byte limits.
    #[must_use]
    pub fn with_quotas(mut self, value_quota: usize, total_quota: usize) -> Self {
        self.value_quota = value_quota;
        self.total_quota = total_quota;
        self
    }

    /// Returns the backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Total bytes currently used (keys plus values).
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.data
            .read()
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.loaded.initialized() {
            Ok(())
        } else {
            Err(StorageError::Closed)
        }
    }

    async fn load(&self) -> StorageResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        debug!(path = %path.display(), "loading legacy store");
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(StorageError::Unavailable(format!("{}: {e}", path.display())));
            }
        };
        let map: BTreeMap<String, String> = serde_json::from_str(&text)
            .map_err(|e| StorageError::Unavailable(format!("{}: {e}", path.display())))?;
        *self.data.write() = map;
        Ok(())
    }

    /// Writes the current map to disk. Callers hold `write_gate`.
    async fn persist(&self, op: &'static str, key: &str) -> StorageResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let snapshot = {
            let data = self.data.read();
            serde_json::to_string(&*data).map_err(|e| StorageError::operation(op, key, e.to_string()))?
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::operation(op, key, e.to_string()))?;
        }
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, snapshot)
            .await
            .map_err(|e| StorageError::operation(op, key, e.to_string()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| StorageError::operation(op, key, e.to_string()))
    }
}

#[async_trait]
impl StorageBackend for FlatFileBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Legacy
    }

    async fn open(&self) -> StorageResult<()> {
        self.loaded.get_or_try_init(|| self.load()).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.ensure_open()?;
        Ok(self.data.read().get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> StorageResult<()> {
        self.ensure_open()?;
        let entry_size = key.len() + value.len();
        if entry_size > self.value_quota {
            return Err(StorageError::QuotaExceeded {
                key: key.to_string(),
                size: entry_size,
                limit: self.value_quota,
            });
        }

        let _gate = self.write_gate.lock().await;
        let previous = {
            let mut data = self.data.write();
            let old_size = data.get(key).map_or(0, |v| key.len() + v.len());
            let used: usize = data.iter().map(|(k, v)| k.len() + v.len()).sum();
            let projected = used - old_size + entry_size;
            if projected > self.total_quota {
                warn!(key, projected, limit = self.total_quota, "legacy store is full");
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    size: projected,
                    limit: self.total_quota,
                });
            }
            data.insert(key.to_string(), value.to_string())
        };

        if let Err(e) = self.persist("put", key).await {
            let mut data = self.data.write();
            match previous {
                Some(old) => data.insert(key.to_string(), old),
                None => data.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.ensure_open()?;
        let _gate = self.write_gate.lock().await;
        let removed = self.data.write().remove(key);
        if removed.is_none() {
            return Ok(());
        }
        if let Err(e) = self.persist("delete", key).await {
            if let Some(old) = removed {
                self.data.write().insert(key.to_string(), old);
            }
            return Err(e);
        }
        Ok(())
    }

    async fn list_keys(&self) -> StorageResult<Vec<String>> {
        self.ensure_open()?;
        Ok(self.data.read().keys().cloned().collect())
    }

    fn max_value_bytes(&self) -> Option<usize> {
        Some(self.value_quota)
    }
}
