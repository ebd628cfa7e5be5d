//! Record shapes stored by the flashcard application.
//!
//! The engine never looks inside these beyond `id`. They exist so that
//! repositories get typed access through [`crate::Collection`] and
//! [`crate::DocumentSlot`]. Field names are camelCase on disk.

use crate::collection::Record;
use crate::keys;
use crate::layout::now_millis;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// One side of a flashcard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CardFace {
    /// Text shown on this side.
    pub text: String,
    /// Embedded image as a data URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Embedded audio as a data URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
}

impl CardFace {
    /// A text-only face.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// A flashcard belonging to a deck.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flashcard {
    /// Unique id.
    pub id: String,
    /// The owning deck.
    pub deck_id: String,
    /// Question side.
    pub front: CardFace,
    /// Answer side.
    pub back: CardFace,
    /// Creation time (Unix milliseconds).
    #[serde(default)]
    pub created_at: u64,
    /// Last update time (Unix milliseconds).
    #[serde(default)]
    pub updated_at: u64,
}

impl Flashcard {
    /// Creates a card with a fresh id.
    pub fn new(deck_id: impl Into<String>, front: CardFace, back: CardFace) -> Self {
        let now = now_millis();
        Self {
            id: new_id(),
            deck_id: deck_id.into(),
            front,
            back,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Record for Flashcard {
    const COLLECTION: &'static str = keys::FLASHCARDS;

    fn id(&self) -> &str {
        &self.id
    }
}

/// A deck of flashcards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deck {
    /// Unique id.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The user who created the deck.
    pub author_id: String,
    /// Theme applied to the deck's cards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_id: Option<String>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Creation time (Unix milliseconds).
    #[serde(default)]
    pub created_at: u64,
    /// Last update time (Unix milliseconds).
    #[serde(default)]
    pub updated_at: u64,
}

impl Deck {
    /// Creates an empty deck with a fresh id.
    pub fn new(title: impl Into<String>, author_id: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            id: new_id(),
            title: title.into(),
            description: None,
            author_id: author_id.into(),
            theme_id: None,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Record for Deck {
    const COLLECTION: &'static str = keys::DECKS;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Visual theme for cards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Theme {
    /// Unique id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Creator, absent for built-in themes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
    /// Card background color.
    pub background_color: String,
    /// Card text color.
    pub text_color: String,
    /// Background image as a data URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_image: Option<String>,
    /// Creation time (Unix milliseconds).
    #[serde(default)]
    pub created_at: u64,
    /// Last update time (Unix milliseconds).
    #[serde(default)]
    pub updated_at: u64,
}

impl Record for Theme {
    const COLLECTION: &'static str = keys::THEMES;

    fn id(&self) -> &str {
        &self.id
    }
}

/// A code that lets another user import a deck.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareCode {
    /// Unique id.
    pub id: String,
    /// The code users type in.
    pub code: String,
    /// The shared deck.
    pub deck_id: String,
    /// The user who shared it.
    pub author_id: String,
    /// Creation time (Unix milliseconds).
    #[serde(default)]
    pub created_at: u64,
    /// Expiry time (Unix milliseconds), if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl Record for ShareCode {
    const COLLECTION: &'static str = keys::SHARE_CODES;

    fn id(&self) -> &str {
        &self.id
    }
}

/// A user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Contact address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Creation time (Unix milliseconds).
    #[serde(default)]
    pub created_at: u64,
    /// Last update time (Unix milliseconds).
    #[serde(default)]
    pub updated_at: u64,
}

impl Record for User {
    const COLLECTION: &'static str = keys::USERS;

    fn id(&self) -> &str {
        &self.id
    }
}

/// The signed-in session, stored as a document at [`keys::SESSION`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// The signed-in user.
    pub user_id: String,
    /// Opaque session token.
    pub token: String,
    /// Sign-in time (Unix milliseconds).
    #[serde(default)]
    pub created_at: u64,
    /// Expiry time (Unix milliseconds), if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl Session {
    /// Returns true if the session has an expiry in the past.
    #[must_use]
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flashcard_uses_camel_case() {
        let card = Flashcard {
            id: "c1".into(),
            deck_id: "d1".into(),
            front: CardFace::text("Q"),
            back: CardFace::text("A"),
            created_at: 5,
            updated_at: 6,
        };
        assert_eq!(
            serde_json::to_value(&card).unwrap(),
            json!({
                "id": "c1",
                "deckId": "d1",
                "front": { "text": "Q" },
                "back": { "text": "A" },
                "createdAt": 5,
                "updatedAt": 6
            })
        );
    }

    #[test]
    fn minimal_records_decode() {
        let card: Flashcard = serde_json::from_value(json!({
            "id": "c1", "deckId": "d1", "front": { "text": "Q" }, "back": { "text": "A" }
        }))
        .unwrap();
        assert_eq!(card.created_at, 0);

        let deck: Deck =
            serde_json::from_value(json!({ "id": "d1", "title": "T", "authorId": "u1" })).unwrap();
        assert!(deck.tags.is_empty());
    }

    #[test]
    fn new_records_get_unique_ids() {
        let a = Deck::new("A", "u1");
        let b = Deck::new("B", "u1");
        assert_ne!(a.id, b.id);
        assert_eq!(a.created_at, a.updated_at);
        let card = Flashcard::new(&a.id, CardFace::text("Q"), CardFace::text("A"));
        assert_eq!(card.deck_id, a.id);
    }

    #[test]
    fn session_expiry() {
        let session = Session {
            user_id: "u1".into(),
            token: "t".into(),
            created_at: 0,
            expires_at: Some(100),
        };
        assert!(!session.is_expired(99));
        assert!(session.is_expired(100));
    }
}
