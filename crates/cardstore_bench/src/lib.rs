//! Benchmark utilities.

#![warn(missing_docs)]

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{json, Value};

/// Random alphanumeric text of `len` characters.
pub fn random_text(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Text built from a small vocabulary, like real card content.
pub fn wordy_text(words: usize) -> String {
    const VOCAB: [&str; 12] = [
        "the", "deck", "card", "question", "answer", "verb", "noun", "que", "el", "la",
        "palabra", "frase",
    ];
    let mut rng = rand::thread_rng();
    (0..words)
        .map(|_| VOCAB[rng.gen_range(0..VOCAB.len())])
        .collect::<Vec<_>>()
        .join(" ")
}

/// `count` flashcard records with `words` words on each side.
pub fn flashcards(count: usize, words: usize) -> Vec<Value> {
    (0..count)
        .map(|i| {
            json!({
                "id": format!("c{i}"),
                "deckId": "d1",
                "front": { "text": wordy_text(words) },
                "back": { "text": wordy_text(words) },
                "createdAt": 1_700_000_000_000u64 + i as u64,
            })
        })
        .collect()
}
