//! Directory-based primary store.

use crate::backend::{BackendKind, StorageBackend};
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::OnceCell;
use tracing::debug;

/// Name of the lock file inside the store directory.
const LOCK_FILE: &str = "LOCK";
/// Extension of value files.
const VALUE_EXT: &str = "val";

/// The primary structured store, kept as one file per key in a directory.
///
/// Keys are hex-encoded into file names so any key text is a valid name.
/// Writes go to a temporary file which is then renamed over the old value,
/// so a reader never observes a half-written value.
///
/// # Locking
///
/// `open` takes an exclusive lock on `LOCK` inside the directory. The lock
/// is held until the backend is dropped; a second process opening the same
/// directory gets [`StorageError::Unavailable`].
///
/// # Example
///
/// ```no_run
/// use cardstore_storage::{FileBackend, StorageBackend};
///
/// # async fn demo() -> cardstore_storage::StorageResult<()> {
/// let backend = FileBackend::new("/var/lib/cardstore/primary");
/// backend.open().await?;
/// backend.put("decks", "R:[]").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct FileBackend {
    dir: PathBuf,
    lock: OnceCell<File>,
    tmp_counter: AtomicU64,
}

impl FileBackend {
    /// Creates a backend rooted at `dir`. Nothing touches the disk until
    /// [`StorageBackend::open`] is called.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: OnceCell::new(),
            tmp_counter: AtomicU64::new(0),
        }
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn value_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{VALUE_EXT}", hex::encode(key.as_bytes())))
    }

    fn key_from_file_name(name: &str) -> Option<String> {
        let stem = name.strip_suffix(&format!(".{VALUE_EXT}"))?;
        let bytes = hex::decode(stem).ok()?;
        String::from_utf8(bytes).ok()
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.lock.initialized() {
            Ok(())
        } else {
            Err(StorageError::Closed)
        }
    }

    async fn acquire(dir: PathBuf) -> StorageResult<File> {
        tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&dir)
                .map_err(|e| StorageError::Unavailable(format!("{}: {e}", dir.display())))?;
            let lock = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(dir.join(LOCK_FILE))
                .map_err(|e| StorageError::Unavailable(format!("{}: {e}", dir.display())))?;
            lock.try_lock_exclusive().map_err(|_| {
                StorageError::Unavailable(format!("{} is locked by another process", dir.display()))
            })?;
            Ok(lock)
        })
        .await
        .map_err(|e| StorageError::Unavailable(format!("open task failed: {e}")))?
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Primary
    }

    async fn open(&self) -> StorageResult<()> {
        self.lock
            .get_or_try_init(|| async {
                debug!(dir = %self.dir.display(), "opening primary store");
                Self::acquire(self.dir.clone()).await
            })
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.ensure_open()?;
        match tokio::fs::read_to_string(self.value_path(key)).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::operation("get", key, e.to_string())),
        }
    }

    async fn put(&self, key: &str, value: &str) -> StorageResult<()> {
        self.ensure_open()?;
        let target = self.value_path(key);
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let tmp = self.dir.join(format!(".{}.{n}.tmp", hex::encode(key.as_bytes())));

        tokio::fs::write(&tmp, value)
            .await
            .map_err(|e| StorageError::operation("put", key, e.to_string()))?;
        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StorageError::operation("put", key, e.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.ensure_open()?;
        match tokio::fs::remove_file(self.value_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::operation("delete", key, e.to_string())),
        }
    }

    async fn list_keys(&self) -> StorageResult<Vec<String>> {
        self.ensure_open()?;
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| StorageError::operation("list", "", e.to_string()))?;

        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::operation("list", "", e.to_string()))?
        {
            if let Some(key) = entry
                .file_name()
                .to_str()
                .and_then(Self::key_from_file_name)
            {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}
