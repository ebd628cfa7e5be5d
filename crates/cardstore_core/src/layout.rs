//! Persisted layout of documents and collections on a backend.
//!
//! Every value goes through the compression codec on its way in and out.
//! Collections additionally go through the segmentation codec:
//!
//! ```text
//! <key>        [record, ...]                                  small collection
//! <key>        {"segmented":true,"segmentCount":n,...}        large collection
//! <key>#0..n   [record, ...]                                  its segments
//! ```
//!
//! These functions hold no state. The engine decides which backend they
//! run against.

use crate::error::{CoreError, CoreResult};
use cardstore_codec::{
    classify, decode_value, encode_value, encoding_of, parse_segment_key, plan, reassemble,
    segment_key, CompressionPolicy, Encoding, SegmentMeta, SegmentPlan, SegmentSlot,
    SegmentWarning, StoredCollection,
};
use cardstore_storage::StorageBackend;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// A collection read back from a backend.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CollectionRead {
    /// Records in stored order.
    pub records: Vec<Value>,
    /// Whether the collection was stored in segments.
    pub segmented: bool,
    /// Consistency problems met while reassembling segments.
    pub warnings: Vec<SegmentWarning>,
}

/// What a collection write left on the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteSummary {
    /// Segments written (zero for a single value).
    pub segments: usize,
    /// Stale segments deleted.
    pub pruned: usize,
    /// Encoded bytes written.
    pub bytes: usize,
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

fn parse(key: &str, stored: &str) -> CoreResult<Value> {
    serde_json::from_str(&decode_value(stored)).map_err(|e| CoreError::decode(key, e))
}

/// Reads and decodes the JSON stored at `key`.
///
/// # Errors
///
/// Returns an error if the backend fails or the value cannot be decoded.
pub async fn read_value(backend: &dyn StorageBackend, key: &str) -> CoreResult<Option<Value>> {
    match backend.get(key).await? {
        Some(stored) => parse(key, &stored).map(Some),
        None => Ok(None),
    }
}

/// Encodes `value` and stores it at `key`. Returns the bytes written.
///
/// # Errors
///
/// Returns an error if the backend rejects the write.
pub async fn write_value(
    backend: &dyn StorageBackend,
    key: &str,
    value: &Value,
    policy: &CompressionPolicy,
) -> CoreResult<usize> {
    let stored = encode_value(&value.to_string(), policy);
    backend.put(key, &stored).await?;
    Ok(stored.len())
}

/// Reads the collection stored at `key`, reassembling segments.
///
/// Missing or corrupt segments do not fail the read: the records that
/// could be decoded are returned and the problems are listed in
/// [`CollectionRead::warnings`].
///
/// # Errors
///
/// Returns an error if the backend fails or the value at `key` itself
/// cannot be decoded.
pub async fn read_collection(
    backend: &dyn StorageBackend,
    key: &str,
) -> CoreResult<Option<CollectionRead>> {
    let Some(value) = read_value(backend, key).await? else {
        return Ok(None);
    };
    match classify(value).map_err(|e| CoreError::decode(key, e))? {
        StoredCollection::Records(records) => Ok(Some(CollectionRead {
            records,
            segmented: false,
            warnings: Vec::new(),
        })),
        StoredCollection::Segmented(meta) => {
            let slots = read_segments(backend, key, &meta).await?;
            let out = reassemble(key, &meta, slots);
            Ok(Some(CollectionRead {
                records: out.records,
                segmented: true,
                warnings: out.warnings,
            }))
        }
    }
}

async fn read_segments(
    backend: &dyn StorageBackend,
    key: &str,
    meta: &SegmentMeta,
) -> CoreResult<Vec<SegmentSlot>> {
    let mut slots = Vec::new();
    for index in 0..meta.segment_count {
        let seg_key = segment_key(key, index);
        let slot = match backend.get(&seg_key).await? {
            None => SegmentSlot::Missing,
            Some(stored) => match serde_json::from_str(&decode_value(&stored)) {
                Ok(value) => SegmentSlot::Present(value),
                Err(e) => SegmentSlot::Corrupt(e.to_string()),
            },
        };
        slots.push(slot);
    }
    Ok(slots)
}

/// Number of segments currently recorded at `key`, or zero.
///
/// A value that cannot be decoded counts as unsegmented; any segments it
/// left behind are removed by [`sweep_orphans`].
async fn stored_segment_count(backend: &dyn StorageBackend, key: &str) -> CoreResult<usize> {
    let value = match read_value(backend, key).await {
        Ok(Some(value)) => value,
        Ok(None) => return Ok(0),
        Err(e) if e.is_backend_failure() => return Err(e),
        Err(e) => {
            warn!(key, error = %e, "previous value is undecodable, assuming no segments");
            return Ok(0);
        }
    };
    Ok(match classify(value) {
        Ok(StoredCollection::Segmented(meta)) => meta.segment_count,
        _ => 0,
    })
}

/// Writes `records` as the whole collection at `key`.
///
/// Segments are written before the metadata that points at them, and
/// segments left over from a previous larger write are deleted last.
///
/// # Errors
///
/// Returns an error if any backend write fails. A failure part way through
/// leaves the previous metadata in place or orphaned segments that
/// [`sweep_orphans`] removes.
pub async fn write_collection(
    backend: &dyn StorageBackend,
    key: &str,
    records: &[Value],
    capacity: usize,
    policy: &CompressionPolicy,
) -> CoreResult<WriteSummary> {
    let previous = stored_segment_count(backend, key).await?;
    let mut summary = WriteSummary::default();

    match plan(records, capacity, now_millis()) {
        SegmentPlan::Single(records) => {
            let value = Value::Array(records.to_vec());
            summary.bytes += write_value(backend, key, &value, policy).await?;
        }
        SegmentPlan::Segmented { meta, chunks } => {
            for (index, chunk) in chunks.iter().enumerate() {
                let value = Value::Array(chunk.to_vec());
                summary.bytes +=
                    write_value(backend, &segment_key(key, index), &value, policy).await?;
            }
            summary.segments = meta.segment_count;
            let meta = serde_json::to_value(&meta)?;
            summary.bytes += write_value(backend, key, &meta, policy).await?;
        }
    }

    for index in summary.segments..previous {
        backend.delete(&segment_key(key, index)).await?;
        summary.pruned += 1;
    }
    debug!(key, records = records.len(), segments = summary.segments, pruned = summary.pruned, "wrote collection");
    Ok(summary)
}

/// Deletes `key` and any segments it owns.
///
/// The owning key goes first so an interrupted delete leaves only orphans,
/// never metadata pointing at missing segments.
///
/// # Errors
///
/// Returns an error if a backend operation fails.
pub async fn delete_entry(backend: &dyn StorageBackend, key: &str) -> CoreResult<()> {
    let segments = stored_segment_count(backend, key).await?;
    backend.delete(key).await?;
    for index in 0..segments {
        backend.delete(&segment_key(key, index)).await?;
    }
    Ok(())
}

/// Deletes segment keys that no metadata accounts for.
///
/// A segment is an orphan if its owner is absent, is not segmented, or
/// records fewer segments than the segment's index. Returns the deleted
/// keys. Must not run concurrently with collection writes to the same
/// backend.
///
/// # Errors
///
/// Returns an error if listing or deleting fails.
pub async fn sweep_orphans(backend: &dyn StorageBackend) -> CoreResult<Vec<String>> {
    let keys = backend.list_keys().await?;
    let mut by_owner: BTreeMap<&str, Vec<(usize, &str)>> = BTreeMap::new();
    for key in &keys {
        if let Some((owner, index)) = parse_segment_key(key) {
            by_owner.entry(owner).or_default().push((index, key.as_str()));
        }
    }

    let mut removed = Vec::new();
    for (owner, segments) in by_owner {
        let count = stored_segment_count(backend, owner).await?;
        for (index, key) in segments {
            if index >= count {
                backend.delete(key).await?;
                removed.push(key.to_string());
            }
        }
    }
    if !removed.is_empty() {
        warn!(kind = %backend.kind(), count = removed.len(), "removed orphaned segments");
    }
    Ok(removed)
}

/// Lists logical keys: everything except segment keys.
///
/// # Errors
///
/// Returns an error if listing fails.
pub async fn logical_keys(backend: &dyn StorageBackend) -> CoreResult<Vec<String>> {
    Ok(backend
        .list_keys()
        .await?
        .into_iter()
        .filter(|k| parse_segment_key(k).is_none())
        .collect())
}

/// The decoded shape of a stored entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// A JSON value that is not a record list.
    Document,
    /// An unsegmented record list.
    Records {
        /// Number of records.
        count: usize,
    },
    /// A segmented record list.
    Segmented {
        /// The stored metadata.
        meta: SegmentMeta,
        /// Records actually recovered.
        recovered: usize,
        /// Problems found while reassembling.
        warnings: Vec<SegmentWarning>,
    },
    /// The value could not be decoded.
    Undecodable {
        /// Description of the problem.
        message: String,
    },
}

/// A report on one stored key, for inspection tools.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryDescription {
    /// The key described.
    pub key: String,
    /// The encoding tag of the value at the key.
    pub encoding: Encoding,
    /// Size of the stored value at the key, excluding segments.
    pub stored_bytes: usize,
    /// What the value decodes to.
    pub shape: Shape,
}

impl EntryDescription {
    /// Returns true if the entry decodes cleanly and all segments agree.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        match &self.shape {
            Shape::Document | Shape::Records { .. } => true,
            Shape::Segmented { warnings, .. } => warnings.is_empty(),
            Shape::Undecodable { .. } => false,
        }
    }
}

/// Describes the value stored at `key`, or `None` if it is absent.
///
/// # Errors
///
/// Returns an error only if the backend fails; decoding problems are part
/// of the description.
pub async fn describe(
    backend: &dyn StorageBackend,
    key: &str,
) -> CoreResult<Option<EntryDescription>> {
    let Some(stored) = backend.get(key).await? else {
        return Ok(None);
    };
    let shape = match parse(key, &stored) {
        Err(e) => Shape::Undecodable {
            message: e.to_string(),
        },
        Ok(value) if value.is_array() || value.get("segmented").is_some() => {
            match classify(value) {
                Ok(StoredCollection::Records(records)) => Shape::Records {
                    count: records.len(),
                },
                Ok(StoredCollection::Segmented(meta)) => {
                    let slots = read_segments(backend, key, &meta).await?;
                    let out = reassemble(key, &meta, slots);
                    Shape::Segmented {
                        meta,
                        recovered: out.records.len(),
                        warnings: out.warnings,
                    }
                }
                Err(e) => Shape::Undecodable {
                    message: e.to_string(),
                },
            }
        }
        Ok(_) => Shape::Document,
    };
    Ok(Some(EntryDescription {
        key: key.to_string(),
        encoding: encoding_of(&stored),
        stored_bytes: stored.len(),
        shape,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardstore_storage::{BackendKind, InMemoryBackend};
    use serde_json::json;

    async fn backend() -> InMemoryBackend {
        let backend = InMemoryBackend::new(BackendKind::Primary);
        backend.open().await.unwrap();
        backend
    }

    fn cards(n: usize) -> Vec<Value> {
        (0..n)
            .map(|i| json!({ "id": format!("c{i}"), "deckId": "d1" }))
            .collect()
    }

    #[tokio::test]
    async fn small_collection_is_one_value() {
        let backend = backend().await;
        let records = cards(1);
        let summary = write_collection(&backend, "flashcards", &records, 10, &CompressionPolicy::default())
            .await
            .unwrap();
        assert_eq!(summary.segments, 0);
        assert_eq!(backend.list_keys().await.unwrap(), vec!["flashcards"]);

        let read = read_collection(&backend, "flashcards").await.unwrap().unwrap();
        assert!(!read.segmented);
        assert_eq!(read.records, records);
    }

    #[tokio::test]
    async fn large_collection_is_segmented() {
        let backend = backend().await;
        let records = cards(26);
        let summary = write_collection(&backend, "flashcards", &records, 10, &CompressionPolicy::default())
            .await
            .unwrap();
        assert_eq!(summary.segments, 3);

        let meta = read_value(&backend, "flashcards").await.unwrap().unwrap();
        assert_eq!(meta["segmented"], json!(true));
        assert_eq!(meta["segmentCount"], json!(3));
        assert_eq!(meta["totalRecords"], json!(26));

        let read = read_collection(&backend, "flashcards").await.unwrap().unwrap();
        assert!(read.segmented);
        assert!(read.warnings.is_empty());
        assert_eq!(read.records, records);
    }

    #[tokio::test]
    async fn shrinking_prunes_stale_segments() {
        let backend = backend().await;
        let policy = CompressionPolicy::default();
        write_collection(&backend, "decks", &cards(35), 10, &policy)
            .await
            .unwrap();
        let summary = write_collection(&backend, "decks", &cards(12), 10, &policy)
            .await
            .unwrap();
        assert_eq!(summary.segments, 2);
        assert_eq!(summary.pruned, 2);
        assert_eq!(
            backend.list_keys().await.unwrap(),
            vec!["decks", "decks#0", "decks#1"]
        );

        let summary = write_collection(&backend, "decks", &cards(3), 10, &policy)
            .await
            .unwrap();
        assert_eq!(summary.pruned, 2);
        assert_eq!(backend.list_keys().await.unwrap(), vec!["decks"]);
        assert_eq!(
            read_collection(&backend, "decks").await.unwrap().unwrap().records,
            cards(3)
        );
    }

    #[tokio::test]
    async fn empty_collection_is_unsegmented() {
        let backend = backend().await;
        write_collection(&backend, "themes", &[], 10, &CompressionPolicy::default())
            .await
            .unwrap();
        assert_eq!(
            read_value(&backend, "themes").await.unwrap(),
            Some(json!([]))
        );
    }

    #[tokio::test]
    async fn missing_segment_is_best_effort() {
        let backend = backend().await;
        write_collection(&backend, "flashcards", &cards(25), 10, &CompressionPolicy::default())
            .await
            .unwrap();
        backend.delete("flashcards#1").await.unwrap();

        let read = read_collection(&backend, "flashcards").await.unwrap().unwrap();
        assert_eq!(read.records.len(), 15);
        assert_eq!(read.records[10], json!({ "id": "c20", "deckId": "d1" }));
        assert!(read
            .warnings
            .contains(&SegmentWarning::Missing { index: 1 }));
    }

    #[tokio::test]
    async fn corrupt_segment_is_skipped() {
        let backend = backend().await;
        write_collection(&backend, "flashcards", &cards(12), 10, &CompressionPolicy::disabled())
            .await
            .unwrap();
        backend.insert_raw("flashcards#0", "C:!!not base64!!");

        let read = read_collection(&backend, "flashcards").await.unwrap().unwrap();
        assert_eq!(read.records, cards(12)[10..].to_vec());
        assert!(matches!(read.warnings[0], SegmentWarning::Corrupt { index: 0, .. }));
    }

    #[tokio::test]
    async fn untagged_legacy_values_are_read() {
        let backend = backend().await;
        backend.insert_raw("user", r#"{"id":"u1","name":"Ada"}"#);
        assert_eq!(
            read_value(&backend, "user").await.unwrap(),
            Some(json!({ "id": "u1", "name": "Ada" }))
        );
    }

    #[tokio::test]
    async fn malformed_json_is_a_decode_error() {
        let backend = backend().await;
        backend.insert_raw("user", "R:{not json");
        let err = read_value(&backend, "user").await.unwrap_err();
        assert!(matches!(err, CoreError::Decode { ref key, .. } if key == "user"));
    }

    #[tokio::test]
    async fn delete_entry_removes_segments() {
        let backend = backend().await;
        write_collection(&backend, "decks", &cards(21), 10, &CompressionPolicy::default())
            .await
            .unwrap();
        backend.insert_raw("themes", "R:[]");
        delete_entry(&backend, "decks").await.unwrap();
        assert_eq!(backend.list_keys().await.unwrap(), vec!["themes"]);
    }

    #[tokio::test]
    async fn sweep_removes_only_orphans() {
        let backend = backend().await;
        let policy = CompressionPolicy::default();
        write_collection(&backend, "decks", &cards(15), 10, &policy)
            .await
            .unwrap();
        backend.insert_raw("decks#2", "R:[]");
        backend.insert_raw("themes", "R:[]");
        backend.insert_raw("themes#0", "R:[]");
        backend.insert_raw("gone#0", "R:[]");

        let removed = sweep_orphans(&backend).await.unwrap();
        assert_eq!(removed, vec!["decks#2", "gone#0", "themes#0"]);
        assert_eq!(
            backend.list_keys().await.unwrap(),
            vec!["decks", "decks#0", "decks#1", "themes"]
        );
    }

    #[tokio::test]
    async fn describe_reports_shapes() {
        let backend = backend().await;
        let policy = CompressionPolicy::default();
        write_collection(&backend, "flashcards", &cards(26), 10, &policy)
            .await
            .unwrap();
        write_value(&backend, "user", &json!({ "id": "u1" }), &policy)
            .await
            .unwrap();
        backend.insert_raw("session", "R:{oops");

        let desc = describe(&backend, "flashcards").await.unwrap().unwrap();
        assert!(desc.is_consistent());
        assert!(matches!(desc.shape, Shape::Segmented { recovered: 26, .. }));

        let desc = describe(&backend, "user").await.unwrap().unwrap();
        assert_eq!(desc.shape, Shape::Document);
        assert_eq!(desc.encoding, Encoding::Raw);

        let desc = describe(&backend, "session").await.unwrap().unwrap();
        assert!(!desc.is_consistent());

        assert!(describe(&backend, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn logical_keys_skip_segments() {
        let backend = backend().await;
        write_collection(&backend, "decks", &cards(11), 10, &CompressionPolicy::default())
            .await
            .unwrap();
        assert_eq!(logical_keys(&backend).await.unwrap(), vec!["decks"]);
    }
}
