//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains required invariants.

use proptest::prelude::*;
use serde_json::{json, Value};

/// Strategy for generating valid collection names.
///
/// Names never contain the segment separator.
pub fn collection_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-zA-Z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for text fields, including non-ASCII characters.
pub fn text_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        "[a-zA-Z ]{1,40}",
        "\\PC{1,40}",
    ]
}

/// Strategy for strings the compression codec should handle: empty,
/// highly repetitive, and arbitrary Unicode.
pub fn compressible_text_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        ("\\PC{1,8}", 1usize..200).prop_map(|(unit, n)| unit.repeat(n)),
        "\\PC{0,400}",
    ]
}

fn record_body_strategy() -> impl Strategy<Value = (String, String, i64, Vec<String>)> {
    (
        text_strategy(),
        text_strategy(),
        any::<i64>(),
        prop::collection::vec("[a-z]{1,8}", 0..4),
    )
}

/// Strategy for a record array with unique ids, in a random order.
pub fn records_strategy(max_len: usize) -> impl Strategy<Value = Vec<Value>> {
    prop::collection::vec(record_body_strategy(), 0..=max_len)
        .prop_map(|bodies| {
            bodies
                .into_iter()
                .enumerate()
                .map(|(i, (front, back, score, tags))| {
                    json!({
                        "id": format!("r{i}"),
                        "front": { "text": front },
                        "back": { "text": back },
                        "score": score,
                        "tags": tags,
                    })
                })
                .collect::<Vec<_>>()
        })
        .prop_shuffle()
}

/// Strategy for document values.
pub fn document_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        text_strategy().prop_map(Value::String),
        ("[a-z0-9]{1,12}", text_strategy())
            .prop_map(|(id, name)| json!({ "id": id, "name": name })),
    ]
}

/// One facade call in a generated sequence.
#[derive(Debug, Clone)]
pub enum EngineOperation {
    /// Replace a collection
    PutCollection {
        /// Collection key
        key: String,
        /// New records
        records: Vec<Value>,
    },
    /// Replace a document
    PutDocument {
        /// Document key
        key: String,
        /// New value
        value: Value,
    },
    /// Delete a key
    Delete {
        /// Key to delete
        key: String,
    },
}

/// Keys the operation strategies pick from. Collections and documents use
/// disjoint keys so that reads know which shape to expect.
pub const COLLECTION_KEYS: [&str; 3] = ["decks", "flashcards", "notes"];
/// Document keys the operation strategies pick from.
pub const DOCUMENT_KEYS: [&str; 2] = ["user", "prefs"];

/// Strategy for generating engine operations.
pub fn engine_operation_strategy() -> impl Strategy<Value = EngineOperation> {
    let collection_key = prop::sample::select(COLLECTION_KEYS.to_vec()).prop_map(String::from);
    let document_key = prop::sample::select(DOCUMENT_KEYS.to_vec()).prop_map(String::from);
    let any_key = prop::sample::select(
        COLLECTION_KEYS
            .iter()
            .chain(DOCUMENT_KEYS.iter())
            .copied()
            .collect::<Vec<_>>(),
    )
    .prop_map(String::from);
    prop_oneof![
        3 => (collection_key, records_strategy(30))
            .prop_map(|(key, records)| EngineOperation::PutCollection { key, records }),
        2 => (document_key, document_strategy())
            .prop_map(|(key, value)| EngineOperation::PutDocument { key, value }),
        1 => any_key.prop_map(|key| EngineOperation::Delete { key }),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<EngineOperation>> {
    prop::collection::vec(engine_operation_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn collection_names_have_no_separator(name in collection_name_strategy()) {
            prop_assert!(!name.contains('#'));
            prop_assert!(name.chars().next().is_some_and(|c| c.is_ascii_lowercase()));
        }

        #[test]
        fn record_ids_are_unique(records in records_strategy(40)) {
            let ids: HashSet<_> = records.iter().map(|r| r["id"].as_str().unwrap()).collect();
            prop_assert_eq!(ids.len(), records.len());
        }

        #[test]
        fn operations_use_disjoint_keys(op in engine_operation_strategy()) {
            match op {
                EngineOperation::PutCollection { key, .. } => {
                    prop_assert!(COLLECTION_KEYS.contains(&key.as_str()));
                }
                EngineOperation::PutDocument { key, .. } => {
                    prop_assert!(DOCUMENT_KEYS.contains(&key.as_str()));
                }
                EngineOperation::Delete { .. } => {}
            }
        }
    }
}
