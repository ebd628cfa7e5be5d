//! Cross-crate integration test helpers.
//!
//! [`ModelHarness`] applies facade operations to a [`StorageEngine`] and
//! to a plain in-memory model side by side, then checks that every engine
//! read agrees with the model.

use crate::generators::EngineOperation;
use cardstore_core::{CoreResult, Origin, StorageEngine};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
enum Expected {
    Collection(Vec<Value>),
    Document(Value),
    Deleted,
}

/// A test harness that tracks what every key should hold.
pub struct ModelHarness<'a> {
    engine: &'a StorageEngine,
    model: BTreeMap<String, Expected>,
}

impl<'a> ModelHarness<'a> {
    /// Creates a harness over `engine`, which should start empty.
    pub fn new(engine: &'a StorageEngine) -> Self {
        Self {
            engine,
            model: BTreeMap::new(),
        }
    }

    /// Replaces a collection and tracks it.
    pub async fn put_collection(&mut self, key: &str, records: Vec<Value>) -> CoreResult<()> {
        self.engine.put_collection(key, records.clone()).await?;
        self.model
            .insert(key.to_string(), Expected::Collection(records));
        Ok(())
    }

    /// Replaces a document and tracks it.
    pub async fn put_document(&mut self, key: &str, value: Value) -> CoreResult<()> {
        self.engine.put_document(key, value.clone()).await?;
        self.model.insert(key.to_string(), Expected::Document(value));
        Ok(())
    }

    /// Deletes a key and tracks it.
    pub async fn delete(&mut self, key: &str) -> CoreResult<()> {
        self.engine.delete_key(key).await?;
        self.model.insert(key.to_string(), Expected::Deleted);
        Ok(())
    }

    /// Applies one generated operation.
    pub async fn apply(&mut self, op: EngineOperation) -> CoreResult<()> {
        match op {
            EngineOperation::PutCollection { key, records } => {
                self.put_collection(&key, records).await
            }
            EngineOperation::PutDocument { key, value } => self.put_document(&key, value).await,
            EngineOperation::Delete { key } => self.delete(&key).await,
        }
    }

    /// Reads every tracked key back and returns a description of each
    /// disagreement with the model.
    ///
    /// A deleted key may be read back with either shape, so it is checked
    /// as a document.
    pub async fn mismatches(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for (key, expected) in &self.model {
            match expected {
                Expected::Collection(records) => {
                    let fetched = self.engine.get_collection(key).await;
                    if &fetched.value != records {
                        problems.push(format!(
                            "{key}: expected {} records, read {} from {}",
                            records.len(),
                            fetched.value.len(),
                            fetched.origin
                        ));
                    }
                }
                Expected::Document(value) => {
                    let fetched = self.engine.get_document(key).await;
                    if fetched.value.as_ref() != Some(value) {
                        problems.push(format!("{key}: document differs ({})", fetched.origin));
                    }
                }
                Expected::Deleted => {
                    let fetched = self.engine.get_document(key).await;
                    if fetched.origin != Origin::Missing {
                        problems.push(format!("{key}: deleted key read from {}", fetched.origin));
                    }
                }
            }
        }
        problems
    }

    /// Asserts that every tracked key reads back as modelled.
    ///
    /// # Panics
    ///
    /// Panics with the list of disagreements.
    pub async fn verify(&self) {
        let problems = self.mismatches().await;
        assert!(problems.is_empty(), "engine disagrees with model: {problems:#?}");
    }

    /// Number of tracked keys.
    pub fn tracked(&self) -> usize {
        self.model.len()
    }
}
