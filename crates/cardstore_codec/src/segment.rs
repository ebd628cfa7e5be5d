//! Splitting collections into bounded segments and putting them back.
//!
//! A collection of at most `capacity` records is stored as one JSON array at
//! its own key. A larger one is split into contiguous chunks stored at
//! `<key>#0`, `<key>#1`, ..., and the collection key holds a
//! [`SegmentMeta`] describing them.

use crate::error::{CodecError, CodecResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Separator between a collection key and a segment index.
pub const SEGMENT_SEPARATOR: char = '#';

/// Largest `segmentCount` accepted from stored metadata.
pub const MAX_SEGMENTS: usize = 100_000;

/// Upper bound on records preallocated from a stored `totalRecords`.
const PREALLOC_LIMIT: usize = 4096;

/// Metadata stored at a segmented collection's own key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentMeta {
    /// Always true for stored metadata.
    pub segmented: bool,
    /// Number of segments physically present.
    pub segment_count: usize,
    /// Number of records across all segments.
    pub total_records: usize,
    /// When the collection was written (Unix milliseconds).
    #[serde(default)]
    pub updated_at: u64,
}

/// Returns the key of segment `index` of `key`.
#[must_use]
pub fn segment_key(key: &str, index: usize) -> String {
    format!("{key}{SEGMENT_SEPARATOR}{index}")
}

/// Splits a segment key into its collection key and index.
///
/// Returns `None` for keys that are not segment keys.
#[must_use]
pub fn parse_segment_key(key: &str) -> Option<(&str, usize)> {
    let (base, index) = key.rsplit_once(SEGMENT_SEPARATOR)?;
    if base.is_empty() || index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((base, index.parse().ok()?))
}

/// How a collection write is laid out.
#[derive(Debug, PartialEq)]
pub enum SegmentPlan<'a> {
    /// Store every record as one array at the collection key.
    Single(&'a [Value]),
    /// Store chunks at segment keys and `meta` at the collection key.
    Segmented {
        /// Metadata for the collection key.
        meta: SegmentMeta,
        /// Chunks in order; chunk `i` goes to segment key `i`.
        chunks: Vec<&'a [Value]>,
    },
}

impl SegmentPlan<'_> {
    /// Number of segment keys this plan occupies.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        match self {
            Self::Single(_) => 0,
            Self::Segmented { meta, .. } => meta.segment_count,
        }
    }
}

/// Plans the layout of `records` with at most `capacity` records per
/// segment. A capacity of zero is treated as one.
#[must_use]
pub fn plan(records: &[Value], capacity: usize, updated_at: u64) -> SegmentPlan<'_> {
    let capacity = capacity.max(1);
    if records.len() <= capacity {
        return SegmentPlan::Single(records);
    }
    let chunks: Vec<&[Value]> = records.chunks(capacity).collect();
    SegmentPlan::Segmented {
        meta: SegmentMeta {
            segmented: true,
            segment_count: chunks.len(),
            total_records: records.len(),
            updated_at,
        },
        chunks,
    }
}

/// What is stored at a collection key.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredCollection {
    /// The records themselves.
    Records(Vec<Value>),
    /// Metadata pointing at segments.
    Segmented(SegmentMeta),
}

/// Interprets the JSON stored at a collection key.
///
/// `null` is read as an empty collection.
///
/// # Errors
///
/// Returns an error if the value is neither an array nor valid segment
/// metadata, or if the metadata claims more than [`MAX_SEGMENTS`]
/// segments.
pub fn classify(value: Value) -> CodecResult<StoredCollection> {
    match value {
        Value::Array(records) => Ok(StoredCollection::Records(records)),
        Value::Null => Ok(StoredCollection::Records(Vec::new())),
        Value::Object(ref map) if map.contains_key("segmented") => {
            let meta: SegmentMeta = serde_json::from_value(value)
                .map_err(|e| CodecError::invalid_segment_meta(e.to_string()))?;
            if !meta.segmented {
                return Err(CodecError::invalid_segment_meta("segmented flag is false"));
            }
            if meta.segment_count > MAX_SEGMENTS {
                return Err(CodecError::invalid_segment_meta(format!(
                    "segment count {} exceeds {MAX_SEGMENTS}",
                    meta.segment_count
                )));
            }
            Ok(StoredCollection::Segmented(meta))
        }
        other => Err(CodecError::invalid_segment_meta(format!(
            "expected an array or segment metadata, found {}",
            json_type(&other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The outcome of reading one segment.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentSlot {
    /// The segment was read and parsed.
    Present(Value),
    /// Nothing is stored at the segment key.
    Missing,
    /// The segment could not be decoded.
    Corrupt(String),
}

/// A problem found while reassembling a segmented collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentWarning {
    /// A segment key had no value.
    Missing {
        /// Segment index.
        index: usize,
    },
    /// A segment could not be decoded or was not an array.
    Corrupt {
        /// Segment index.
        index: usize,
        /// Description of the problem.
        message: String,
    },
    /// The reassembled length differs from the recorded total.
    CountMismatch {
        /// `totalRecords` from the metadata.
        expected: usize,
        /// Records actually recovered.
        actual: usize,
    },
}

impl std::fmt::Display for SegmentWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing { index } => write!(f, "segment {index} is missing"),
            Self::Corrupt { index, message } => write!(f, "segment {index} is corrupt: {message}"),
            Self::CountMismatch { expected, actual } => {
                write!(f, "expected {expected} records, recovered {actual}")
            }
        }
    }
}

/// Records recovered from segments, plus anything that went wrong.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reassembled {
    /// Records in segment order.
    pub records: Vec<Value>,
    /// Problems encountered; empty for a consistent collection.
    pub warnings: Vec<SegmentWarning>,
}

impl Reassembled {
    /// Returns true if every segment was present and the count matched.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Concatenates segments `0..meta.segment_count` in order.
///
/// Never fails: missing or corrupt segments are skipped and reported, and a
/// length that disagrees with `total_records` is reported but the
/// best-effort concatenation is still returned.
#[must_use]
pub fn reassemble(
    collection: &str,
    meta: &SegmentMeta,
    slots: impl IntoIterator<Item = SegmentSlot>,
) -> Reassembled {
    let mut out = Reassembled {
        records: Vec::with_capacity(meta.total_records.min(PREALLOC_LIMIT)),
        warnings: Vec::new(),
    };

    for (index, slot) in slots.into_iter().enumerate().take(meta.segment_count) {
        match slot {
            SegmentSlot::Present(Value::Array(records)) => out.records.extend(records),
            SegmentSlot::Present(other) => out.warnings.push(SegmentWarning::Corrupt {
                index,
                message: format!("expected an array, found {}", json_type(&other)),
            }),
            SegmentSlot::Missing => out.warnings.push(SegmentWarning::Missing { index }),
            SegmentSlot::Corrupt(message) => {
                out.warnings.push(SegmentWarning::Corrupt { index, message })
            }
        }
    }

    if out.records.len() != meta.total_records {
        out.warnings.push(SegmentWarning::CountMismatch {
            expected: meta.total_records,
            actual: out.records.len(),
        });
    }

    for warning in &out.warnings {
        warn!(collection, %warning, "segment consistency problem");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cards(n: usize) -> Vec<Value> {
        (0..n).map(|i| json!({ "id": format!("c{i}") })).collect()
    }

    #[test]
    fn small_collection_is_single() {
        let records = cards(10);
        assert_eq!(plan(&records, 10, 0), SegmentPlan::Single(&records[..]));
        assert_eq!(plan(&records, 10, 0).segment_count(), 0);
    }

    #[test]
    fn empty_collection_is_single() {
        assert_eq!(plan(&[], 10, 0), SegmentPlan::Single(&[]));
    }

    #[test]
    fn twenty_six_records_make_three_segments() {
        let records = cards(26);
        let SegmentPlan::Segmented { meta, chunks } = plan(&records, 10, 42) else {
            panic!("expected a segmented plan");
        };
        assert_eq!(
            meta,
            SegmentMeta {
                segmented: true,
                segment_count: 3,
                total_records: 26,
                updated_at: 42,
            }
        );
        let sizes: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![10, 10, 6]);
        assert_eq!(chunks[2][5], json!({ "id": "c25" }));
    }

    #[test]
    fn zero_capacity_is_one() {
        let records = cards(3);
        assert_eq!(plan(&records, 0, 0).segment_count(), 3);
    }

    #[test]
    fn meta_serializes_camel_case() {
        let meta = SegmentMeta {
            segmented: true,
            segment_count: 2,
            total_records: 15,
            updated_at: 7,
        };
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(
            value,
            json!({ "segmented": true, "segmentCount": 2, "totalRecords": 15, "updatedAt": 7 })
        );
    }

    #[test]
    fn segment_keys_round_trip() {
        assert_eq!(segment_key("flashcards", 3), "flashcards#3");
        assert_eq!(parse_segment_key("flashcards#3"), Some(("flashcards", 3)));
        assert_eq!(parse_segment_key("a#b#12"), Some(("a#b", 12)));
        assert_eq!(parse_segment_key("flashcards"), None);
        assert_eq!(parse_segment_key("flashcards#"), None);
        assert_eq!(parse_segment_key("#4"), None);
        assert_eq!(parse_segment_key("x#-1"), None);
    }

    #[test]
    fn classify_shapes() {
        assert_eq!(
            classify(json!([1, 2])).unwrap(),
            StoredCollection::Records(vec![json!(1), json!(2)])
        );
        assert_eq!(classify(Value::Null).unwrap(), StoredCollection::Records(vec![]));
        assert!(matches!(
            classify(json!({ "segmented": true, "segmentCount": 2, "totalRecords": 12 })).unwrap(),
            StoredCollection::Segmented(SegmentMeta { segment_count: 2, updated_at: 0, .. })
        ));
        assert!(classify(json!({ "segmented": false, "segmentCount": 0, "totalRecords": 0 })).is_err());
        assert!(classify(json!("text")).is_err());
        assert!(classify(json!({ "id": "u1" })).is_err());
    }

    #[test]
    fn classify_rejects_absurd_segment_counts() {
        let err = classify(json!({
            "segmented": true,
            "segmentCount": u64::MAX,
            "totalRecords": 1
        }))
        .unwrap_err();
        assert!(err.to_string().contains("segment count"));
        assert!(classify(json!({
            "segmented": true,
            "segmentCount": MAX_SEGMENTS,
            "totalRecords": MAX_SEGMENTS
        }))
        .is_ok());
    }

    #[test]
    fn reassemble_survives_huge_record_totals() {
        let meta = SegmentMeta {
            segmented: true,
            segment_count: 1,
            total_records: usize::MAX,
            updated_at: 0,
        };
        let out = reassemble("decks", &meta, vec![SegmentSlot::Present(json!([{ "id": "d1" }]))]);
        assert_eq!(out.records, vec![json!({ "id": "d1" })]);
        assert_eq!(
            out.warnings,
            vec![SegmentWarning::CountMismatch {
                expected: usize::MAX,
                actual: 1
            }]
        );
    }

    #[test]
    fn reassemble_in_order() {
        let meta = SegmentMeta {
            segmented: true,
            segment_count: 2,
            total_records: 3,
            updated_at: 0,
        };
        let out = reassemble(
            "decks",
            &meta,
            vec![
                SegmentSlot::Present(json!([{ "id": "a" }, { "id": "b" }])),
                SegmentSlot::Present(json!([{ "id": "c" }])),
            ],
        );
        assert!(out.is_consistent());
        assert_eq!(
            out.records,
            vec![json!({ "id": "a" }), json!({ "id": "b" }), json!({ "id": "c" })]
        );
    }

    #[test]
    fn reassemble_is_best_effort() {
        let meta = SegmentMeta {
            segmented: true,
            segment_count: 3,
            total_records: 5,
            updated_at: 0,
        };
        let out = reassemble(
            "decks",
            &meta,
            vec![
                SegmentSlot::Present(json!([{ "id": "a" }, { "id": "b" }])),
                SegmentSlot::Missing,
                SegmentSlot::Corrupt("bad json".into()),
            ],
        );
        assert_eq!(out.records.len(), 2);
        assert_eq!(
            out.warnings,
            vec![
                SegmentWarning::Missing { index: 1 },
                SegmentWarning::Corrupt {
                    index: 2,
                    message: "bad json".into()
                },
                SegmentWarning::CountMismatch {
                    expected: 5,
                    actual: 2
                },
            ]
        );
    }

    #[test]
    fn reassemble_ignores_extra_slots() {
        let meta = SegmentMeta {
            segmented: true,
            segment_count: 1,
            total_records: 1,
            updated_at: 0,
        };
        let out = reassemble(
            "themes",
            &meta,
            vec![
                SegmentSlot::Present(json!([{ "id": "t1" }])),
                SegmentSlot::Present(json!([{ "id": "stale" }])),
            ],
        );
        assert!(out.is_consistent());
        assert_eq!(out.records, vec![json!({ "id": "t1" })]);
    }
}
