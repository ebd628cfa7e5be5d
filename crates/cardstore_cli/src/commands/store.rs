//! Opening an on-disk store.
//!
//! A store directory holds the primary store in `primary/` and the legacy
//! flat store in `legacy.json`.

use cardstore_core::{layout, EngineConfig, EntryDescription, StorageEngine};
use cardstore_storage::{FileBackend, FlatFileBackend, StorageBackend};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Primary store directory inside a store directory.
pub const PRIMARY_DIR: &str = "primary";
/// Legacy store file inside a store directory.
pub const LEGACY_FILE: &str = "legacy.json";

/// The two backends of a store directory.
pub struct Store {
    /// Store directory.
    pub dir: PathBuf,
    /// Primary structured store.
    pub primary: Arc<FileBackend>,
    /// Legacy flat store, also holding backups.
    pub legacy: Arc<FlatFileBackend>,
    /// Engine configuration.
    pub config: EngineConfig,
}

impl Store {
    /// Describes a store directory without touching it.
    pub fn at(dir: &Path, segment_capacity: Option<usize>) -> Self {
        let mut config = EngineConfig::default();
        if let Some(capacity) = segment_capacity {
            config = config.segment_capacity(capacity);
        }
        Self {
            dir: dir.to_path_buf(),
            primary: Arc::new(FileBackend::new(dir.join(PRIMARY_DIR))),
            legacy: Arc::new(FlatFileBackend::new(dir.join(LEGACY_FILE))),
            config,
        }
    }

    /// Like [`Store::at`], but fails if the directory does not exist.
    pub fn existing(
        dir: &Path,
        segment_capacity: Option<usize>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        if !dir.is_dir() {
            return Err(format!("No store found at {}", dir.display()).into());
        }
        Ok(Self::at(dir, segment_capacity))
    }

    /// Builds an engine over this store.
    pub fn engine(&self) -> StorageEngine {
        StorageEngine::new(
            self.primary.clone(),
            self.legacy.clone(),
            self.config.clone(),
        )
    }

    /// Opens both backends directly, bypassing the engine.
    ///
    /// Returns which ones opened.
    pub async fn open_raw(&self) -> (bool, bool) {
        let primary = self.primary.open().await.is_ok();
        let legacy = self.legacy.open().await.is_ok();
        (primary, legacy)
    }
}

/// One described key, flattened for printing.
#[derive(Debug, Serialize)]
pub struct KeyReport {
    /// The key.
    pub key: String,
    /// `compressed`, `raw` or `untagged`.
    pub encoding: &'static str,
    /// Stored bytes at the key itself.
    pub bytes: usize,
    /// `document`, `records`, `segmented` or `undecodable`.
    pub shape: &'static str,
    /// Records held, for collections.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<usize>,
    /// Segments, for segmented collections.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments: Option<usize>,
    /// Consistency problems.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub problems: Vec<String>,
}

impl From<EntryDescription> for KeyReport {
    fn from(desc: EntryDescription) -> Self {
        use cardstore_codec::Encoding;
        use cardstore_core::Shape;

        let encoding = match desc.encoding {
            Encoding::Compressed => "compressed",
            Encoding::Raw => "raw",
            Encoding::Untagged => "untagged",
        };
        let (shape, records, segments, problems) = match desc.shape {
            Shape::Document => ("document", None, None, Vec::new()),
            Shape::Records { count } => ("records", Some(count), None, Vec::new()),
            Shape::Segmented {
                meta,
                recovered,
                warnings,
            } => (
                "segmented",
                Some(recovered),
                Some(meta.segment_count),
                warnings.iter().map(ToString::to_string).collect(),
            ),
            Shape::Undecodable { message } => ("undecodable", None, None, vec![message]),
        };
        Self {
            key: desc.key,
            encoding,
            bytes: desc.stored_bytes,
            shape,
            records,
            segments,
            problems,
        }
    }
}

/// Describes every logical key of `backend`.
pub async fn describe_all(
    backend: &dyn StorageBackend,
) -> Result<Vec<KeyReport>, Box<dyn std::error::Error>> {
    let mut reports = Vec::new();
    for key in layout::logical_keys(backend).await? {
        if let Some(desc) = layout::describe(backend, &key).await? {
            reports.push(KeyReport::from(desc));
        }
    }
    Ok(reports)
}

/// Prints key reports as an aligned table.
pub fn print_table(title: &str, reports: &[KeyReport]) {
    println!("{title}");
    println!("{}", "=".repeat(title.len()));
    if reports.is_empty() {
        println!("  (empty)");
        println!();
        return;
    }
    println!(
        "  {:<28} {:<11} {:>10} {:<12} {:>8} {:>8}",
        "KEY", "ENCODING", "BYTES", "SHAPE", "RECORDS", "SEGMENTS"
    );
    for r in reports {
        println!(
            "  {:<28} {:<11} {:>10} {:<12} {:>8} {:>8}",
            r.key,
            r.encoding,
            r.bytes,
            r.shape,
            r.records.map_or("-".to_string(), |n| n.to_string()),
            r.segments.map_or("-".to_string(), |n| n.to_string()),
        );
        for problem in &r.problems {
            println!("      ! {problem}");
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn describes_segmented_collections() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::at(dir.path(), Some(2));
        let engine = store.engine();
        let cards = (0..5).map(|i| json!({ "id": format!("c{i}") })).collect();
        engine.put_collection("flashcards", cards).await.unwrap();
        engine.put_document("user", json!({ "id": "u1" })).await.unwrap();

        let reports = describe_all(store.primary.as_ref()).await.unwrap();
        let cards = reports.iter().find(|r| r.key == "flashcards").unwrap();
        assert_eq!(cards.shape, "segmented");
        assert_eq!(cards.records, Some(5));
        assert_eq!(cards.segments, Some(3));
        assert!(cards.problems.is_empty());

        let user = reports.iter().find(|r| r.key == "user").unwrap();
        assert_eq!(user.shape, "document");
        // The segments themselves are not listed as keys.
        assert!(reports.iter().all(|r| !r.key.contains('#')));
    }

    #[tokio::test]
    async fn backups_live_in_the_legacy_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::at(dir.path(), None);
        store
            .engine()
            .put_collection("decks", vec![json!({ "id": "d1" })])
            .await
            .unwrap();

        let legacy = describe_all(store.legacy.as_ref()).await.unwrap();
        assert!(legacy.iter().any(|r| r.key == "backup:decks"));
        assert!(dir.path().join(LEGACY_FILE).exists());
    }

    #[test]
    fn existing_requires_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Store::existing(&dir.path().join("missing"), None).is_err());
        assert!(Store::existing(dir.path(), None).is_ok());
    }
}
