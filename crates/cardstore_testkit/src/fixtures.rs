//! Test fixtures and engine helpers.
//!
//! A [`TestEngine`] is one session of a [`StorageEngine`] over two
//! in-memory stores, each behind a [`FaultInjectingBackend`]. The stores
//! outlive the session: [`TestEngine::restart`] starts a new session over
//! the same data, which is how "the app was restarted" is modelled.

use cardstore_core::model::{CardFace, Flashcard};
use cardstore_core::{EngineConfig, StorageEngine};
use cardstore_storage::{
    BackendKind, FaultInjectingBackend, FileBackend, FlatFileBackend, InMemoryBackend,
    StorageBackend,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

/// One engine session over persistent in-memory stores.
pub struct TestEngine {
    /// The engine under test.
    pub engine: Arc<StorageEngine>,
    /// Fault switch in front of the primary store.
    pub primary: Arc<FaultInjectingBackend>,
    /// Fault switch in front of the legacy store.
    pub legacy: Arc<FaultInjectingBackend>,
    primary_store: Arc<InMemoryBackend>,
    legacy_store: Arc<InMemoryBackend>,
    config: EngineConfig,
}

impl TestEngine {
    /// Creates an engine with the default configuration and empty stores.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Creates an engine with `config` and empty stores.
    pub fn with_config(config: EngineConfig) -> Self {
        Self::over(
            Arc::new(InMemoryBackend::new(BackendKind::Primary)),
            Arc::new(InMemoryBackend::new(BackendKind::Legacy)),
            config,
        )
    }

    /// Creates an engine whose legacy store already holds `entries`, as
    /// left behind by an older version of the app.
    pub fn with_legacy<I, K, V>(entries: I, config: EngineConfig) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::over(
            Arc::new(InMemoryBackend::new(BackendKind::Primary)),
            Arc::new(InMemoryBackend::with_entries(BackendKind::Legacy, entries)),
            config,
        )
    }

    fn over(
        primary_store: Arc<InMemoryBackend>,
        legacy_store: Arc<InMemoryBackend>,
        config: EngineConfig,
    ) -> Self {
        let primary = Arc::new(FaultInjectingBackend::wrap(
            primary_store.clone() as Arc<dyn StorageBackend>
        ));
        let legacy = Arc::new(FaultInjectingBackend::wrap(
            legacy_store.clone() as Arc<dyn StorageBackend>
        ));
        let engine = Arc::new(StorageEngine::new(
            primary.clone(),
            legacy.clone(),
            config.clone(),
        ));
        Self {
            engine,
            primary,
            legacy,
            primary_store,
            legacy_store,
            config,
        }
    }

    /// Starts a new session over the same stores, with fresh fault
    /// switches and an empty cache.
    pub fn restart(&self) -> Self {
        Self::over(
            self.primary_store.clone(),
            self.legacy_store.clone(),
            self.config.clone(),
        )
    }

    /// The primary store's raw contents, bypassing faults.
    pub fn primary_store(&self) -> &InMemoryBackend {
        &self.primary_store
    }

    /// The legacy store's raw contents, bypassing faults.
    pub fn legacy_store(&self) -> &InMemoryBackend {
        &self.legacy_store
    }

    /// The configuration sessions are started with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestEngine {
    type Target = StorageEngine;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

/// A store directory on disk with automatic cleanup.
pub struct DiskStore {
    dir: TempDir,
    config: EngineConfig,
}

impl DiskStore {
    /// Creates an empty store directory.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
            config,
        }
    }

    /// The store directory.
    pub fn path(&self) -> &std::path::Path {
        self.dir.path()
    }

    /// Opens a new engine session over the directory.
    pub fn session(&self) -> StorageEngine {
        StorageEngine::new(
            Arc::new(FileBackend::new(self.dir.path().join("primary"))),
            Arc::new(FlatFileBackend::new(self.dir.path().join("legacy.json"))),
            self.config.clone(),
        )
    }
}

/// A flashcard record as stored JSON.
pub fn flashcard(id: &str, deck_id: &str) -> Value {
    json!({
        "id": id,
        "deckId": deck_id,
        "front": { "text": "Q" },
        "back": { "text": "A" },
    })
}

/// `count` flashcards `c0..` in `deck_id`, as stored JSON.
pub fn flashcards(count: usize, deck_id: &str) -> Vec<Value> {
    (0..count)
        .map(|i| {
            json!({
                "id": format!("c{i}"),
                "deckId": deck_id,
                "front": { "text": format!("Question {i}") },
                "back": { "text": format!("Answer {i}") },
            })
        })
        .collect()
}

/// A typed flashcard with a fixed id.
pub fn typed_card(id: &str, deck_id: &str) -> Flashcard {
    Flashcard {
        id: id.to_string(),
        deck_id: deck_id.to_string(),
        front: CardFace::text("Q"),
        back: CardFace::text("A"),
        created_at: 1,
        updated_at: 1,
    }
}

/// A deck record as stored JSON.
pub fn deck(id: &str, title: &str) -> Value {
    json!({ "id": id, "title": title, "authorId": "u1", "tags": [] })
}

/// A user document as stored JSON.
pub fn user(id: &str, name: &str) -> Value {
    json!({ "id": id, "name": name })
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use cardstore_core::keys;

    /// An engine whose critical keys were written, and so mirrored, in an
    /// earlier session.
    pub async fn previously_used(config: EngineConfig) -> TestEngine {
        let first = TestEngine::with_config(config);
        first
            .put_document(keys::CURRENT_USER, user("u1", "Ana"))
            .await
            .expect("Failed to write user");
        first
            .put_collection(keys::DECKS, vec![deck("d1", "Spanish")])
            .await
            .expect("Failed to write decks");
        first
            .put_collection(keys::FLASHCARDS, flashcards(3, "d1"))
            .await
            .expect("Failed to write flashcards");
        first.restart()
    }

    /// Legacy-store entries as an older app version wrote them: plain
    /// untagged JSON under the collection and document keys.
    pub fn legacy_entries(cards: usize) -> Vec<(String, String)> {
        vec![
            (
                keys::DECKS.to_string(),
                Value::Array(vec![deck("d1", "Spanish")]).to_string(),
            ),
            (
                keys::FLASHCARDS.to_string(),
                Value::Array(flashcards(cards, "d1")).to_string(),
            ),
            (keys::CURRENT_USER.to_string(), user("u1", "Ana").to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_use_unique_ids() {
        let cards = flashcards(12, "d1");
        let mut ids: Vec<_> = cards.iter().map(|c| c["id"].as_str().unwrap()).collect();
        ids.dedup();
        assert_eq!(ids.len(), 12);
        assert_eq!(cards[3]["deckId"], "d1");
    }

    #[test]
    fn typed_card_matches_json_builder() {
        let typed = serde_json::to_value(typed_card("c1", "d1")).unwrap();
        assert_eq!(typed["front"], flashcard("c1", "d1")["front"]);
    }

    #[test]
    fn legacy_entries_are_untagged_json() {
        for (_, value) in scenarios::legacy_entries(2) {
            assert!(serde_json::from_str::<Value>(&value).is_ok());
        }
    }
}
