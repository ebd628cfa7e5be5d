//! Typed collection implementation.

use crate::engine::{Fetched, Origin, StorageEngine};
use crate::error::{CoreError, CoreResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::warn;

/// A record type stored in a named collection.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Key of the collection this record type lives in.
    const COLLECTION: &'static str;

    /// The record's unique id.
    fn id(&self) -> &str;
}

fn has_id(value: &Value, id: &str) -> bool {
    value.get("id").and_then(Value::as_str) == Some(id)
}

/// A typed view of one collection.
///
/// Every mutation is a read-modify-write of the whole collection through
/// the engine. Concurrent mutations of the same collection race and the
/// last write wins.
///
/// # Example
///
/// ```rust,ignore
/// let decks: Collection<Deck> = Collection::new(engine.clone());
/// decks.put(Deck::new("Spanish", "u1")).await?;
/// let spanish = decks.find_by("authorId", "u1").await;
/// ```
pub struct Collection<T: Record> {
    engine: Arc<StorageEngine>,
    name: String,
    _marker: PhantomData<T>,
}

impl<T: Record> std::fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection").field("name", &self.name).finish()
    }
}

impl<T: Record> Collection<T> {
    /// Creates a view of `T::COLLECTION`.
    pub fn new(engine: Arc<StorageEngine>) -> Self {
        Self::named(engine, T::COLLECTION)
    }

    /// Creates a view of a differently named collection of `T`.
    pub fn named(engine: Arc<StorageEngine>, name: impl Into<String>) -> Self {
        Self {
            engine,
            name: name.into(),
            _marker: PhantomData,
        }
    }

    /// Returns the collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn decode_all(&self, values: Vec<Value>) -> Vec<T> {
        values
            .into_iter()
            .filter_map(|value| match serde_json::from_value(value) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(collection = %self.name, error = %e, "skipping undecodable record");
                    None
                }
            })
            .collect()
    }

    /// Reads every record. Records that do not decode as `T` are skipped.
    pub async fn all(&self) -> Fetched<Vec<T>> {
        let fetched = self.engine.get_collection(&self.name).await;
        let origin = fetched.origin;
        Fetched {
            value: self.decode_all(fetched.value),
            origin,
        }
    }

    /// Reads one record by id.
    pub async fn get(&self, id: &str) -> Fetched<Option<T>> {
        self.engine
            .get_collection(&self.name)
            .await
            .map(|values| {
                values
                    .into_iter()
                    .find(|v| has_id(v, id))
                    .and_then(|v| self.decode_all(vec![v]).pop())
            })
    }

    /// Returns records whose string `field` equals `value`.
    ///
    /// This is a scan of the whole collection, used for foreign keys such
    /// as `deckId` or `authorId`.
    pub async fn find_by(&self, field: &str, value: &str) -> Fetched<Vec<T>> {
        let fetched = self.engine.get_collection(&self.name).await;
        let origin = fetched.origin;
        let matching = fetched
            .value
            .into_iter()
            .filter(|v| v.get(field).and_then(Value::as_str) == Some(value))
            .collect();
        Fetched {
            value: self.decode_all(matching),
            origin,
        }
    }

    /// Reads the raw records for a read-modify-write.
    ///
    /// Refuses when the engine could not tell what is stored, since
    /// writing back an empty default would erase the collection.
    async fn current(&self) -> CoreResult<Vec<Value>> {
        let fetched = self.engine.get_collection(&self.name).await;
        if fetched.origin == Origin::Unavailable {
            return Err(CoreError::backend_unavailable(format!(
                "cannot modify {}: current contents unknown",
                self.name
            )));
        }
        Ok(fetched.value)
    }

    /// Inserts `record`, or replaces the record with the same id in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be read or written.
    pub async fn put(&self, record: T) -> CoreResult<()> {
        let mut values = self.current().await?;
        let id = record.id().to_string();
        let value = serde_json::to_value(&record)?;
        match values.iter_mut().find(|v| has_id(v, &id)) {
            Some(slot) => *slot = value,
            None => values.push(value),
        }
        self.engine.put_collection(&self.name, values).await
    }

    /// Removes the record with `id`. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be read or written.
    pub async fn remove(&self, id: &str) -> CoreResult<bool> {
        let mut values = self.current().await?;
        let before = values.len();
        values.retain(|v| !has_id(v, id));
        if values.len() == before {
            return Ok(false);
        }
        self.engine.put_collection(&self.name, values).await?;
        Ok(true)
    }

    /// Replaces the whole collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the records cannot be written.
    pub async fn replace_all(&self, records: &[T]) -> CoreResult<()> {
        let values = records
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        self.engine.put_collection(&self.name, values).await
    }
}

/// A typed single document, such as the current user or session.
pub struct DocumentSlot<T> {
    engine: Arc<StorageEngine>,
    key: String,
    _marker: PhantomData<T>,
}

impl<T> std::fmt::Debug for DocumentSlot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentSlot").field("key", &self.key).finish()
    }
}

impl<T: Serialize + DeserializeOwned> DocumentSlot<T> {
    /// Creates a slot for `key`.
    pub fn new(engine: Arc<StorageEngine>, key: impl Into<String>) -> Self {
        Self {
            engine,
            key: key.into(),
            _marker: PhantomData,
        }
    }

    /// Reads the document. A stored value that does not decode as `T` is
    /// reported as absent.
    pub async fn get(&self) -> Fetched<Option<T>> {
        let key = &self.key;
        self.engine.get_document(key).await.map(|value| {
            value.and_then(|v| match serde_json::from_value(v) {
                Ok(doc) => Some(doc),
                Err(e) => {
                    warn!(key = %key, error = %e, "stored document does not decode");
                    None
                }
            })
        })
    }

    /// Writes the document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub async fn set(&self, doc: &T) -> CoreResult<()> {
        self.engine
            .put_document(&self.key, serde_json::to_value(doc)?)
            .await
    }

    /// Deletes the document and its mirrored copy.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be deleted.
    pub async fn clear(&self) -> CoreResult<()> {
        self.engine.delete_key(&self.key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::keys;
    use crate::model::{CardFace, Deck, Flashcard, Session};
    use cardstore_storage::{BackendKind, FaultInjectingBackend, InMemoryBackend};
    use serde_json::json;

    fn engine() -> (Arc<FaultInjectingBackend>, Arc<StorageEngine>) {
        let primary = Arc::new(FaultInjectingBackend::new(InMemoryBackend::new(
            BackendKind::Primary,
        )));
        let legacy = Arc::new(InMemoryBackend::new(BackendKind::Legacy));
        let engine = StorageEngine::new(primary.clone(), legacy, EngineConfig::default());
        (primary, Arc::new(engine))
    }

    fn card(id: &str, deck: &str) -> Flashcard {
        Flashcard {
            id: id.into(),
            deck_id: deck.into(),
            front: CardFace::text("Q"),
            back: CardFace::text("A"),
            created_at: 1,
            updated_at: 1,
        }
    }

    #[tokio::test]
    async fn put_upserts_in_place() {
        let (_, engine) = engine();
        let cards: Collection<Flashcard> = Collection::new(engine);
        cards.put(card("c1", "d1")).await.unwrap();
        cards.put(card("c2", "d1")).await.unwrap();

        let mut edited = card("c1", "d1");
        edited.back = CardFace::text("B");
        cards.put(edited).await.unwrap();

        let all = cards.all().await.value;
        assert_eq!(all.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), vec!["c1", "c2"]);
        assert_eq!(all[0].back.text, "B");
    }

    #[tokio::test]
    async fn find_by_foreign_key() {
        let (_, engine) = engine();
        let cards: Collection<Flashcard> = Collection::new(engine);
        cards
            .replace_all(&[card("c1", "d1"), card("c2", "d2"), card("c3", "d1")])
            .await
            .unwrap();

        let found = cards.find_by("deckId", "d1").await.value;
        assert_eq!(found.len(), 2);
        assert_eq!(cards.get("c2").await.value.unwrap().deck_id, "d2");
        assert!(cards.get("c9").await.value.is_none());
    }

    #[tokio::test]
    async fn remove_reports_existence() {
        let (_, engine) = engine();
        let decks: Collection<Deck> = Collection::new(engine);
        let deck = Deck::new("Spanish", "u1");
        let id = deck.id.clone();
        decks.put(deck).await.unwrap();
        assert!(decks.remove(&id).await.unwrap());
        assert!(!decks.remove(&id).await.unwrap());
        assert!(decks.all().await.value.is_empty());
    }

    #[tokio::test]
    async fn undecodable_records_survive_updates() {
        let (_, engine) = engine();
        engine
            .put_collection(keys::FLASHCARDS, vec![json!({ "id": "odd", "shape": 1 })])
            .await
            .unwrap();
        let cards: Collection<Flashcard> = Collection::new(Arc::clone(&engine));
        assert!(cards.all().await.value.is_empty());

        cards.put(card("c1", "d1")).await.unwrap();
        assert_eq!(engine.get_collection(keys::FLASHCARDS).await.value.len(), 2);
    }

    #[tokio::test]
    async fn refuses_to_modify_unknown_contents() {
        let (primary, engine) = engine();
        engine.init().await;
        primary.fail_reads(true);
        let cards: Collection<Flashcard> = Collection::new(engine);
        let err = cards.put(card("c1", "d1")).await.unwrap_err();
        assert!(matches!(err, CoreError::BackendUnavailable { .. }));
    }

    #[tokio::test]
    async fn document_slot_round_trip() {
        let (_, engine) = engine();
        let slot: DocumentSlot<Session> = DocumentSlot::new(engine, keys::SESSION);
        assert!(slot.get().await.value.is_none());

        let session = Session {
            user_id: "u1".into(),
            token: "t".into(),
            created_at: 1,
            expires_at: Some(2),
        };
        slot.set(&session).await.unwrap();
        assert_eq!(slot.get().await.value, Some(session));

        slot.clear().await.unwrap();
        assert_eq!(slot.get().await.origin, Origin::Missing);
    }
}
