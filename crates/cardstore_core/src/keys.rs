//! Well-known storage keys.

/// The active session document.
pub const SESSION: &str = "session";
/// The signed-in user document.
pub const CURRENT_USER: &str = "user";
/// Deck records.
pub const DECKS: &str = "decks";
/// Theme records.
pub const THEMES: &str = "themes";
/// Flashcard records.
pub const FLASHCARDS: &str = "flashcards";
/// Share-code records.
pub const SHARE_CODES: &str = "shareCodes";
/// Known user records.
pub const USERS: &str = "users";

/// Keys mirrored to the backup store by default.
pub const CRITICAL: [&str; 5] = [SESSION, CURRENT_USER, DECKS, THEMES, FLASHCARDS];

/// Collection keys the application writes.
pub const COLLECTIONS: [&str; 5] = [DECKS, THEMES, FLASHCARDS, SHARE_CODES, USERS];

/// Document keys the application writes.
pub const DOCUMENTS: [&str; 2] = [SESSION, CURRENT_USER];
