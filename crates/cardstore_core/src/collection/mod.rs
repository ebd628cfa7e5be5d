//! Typed collection API.
//!
//! Provides `Collection<T>` for typed access to a stored collection and
//! `DocumentSlot<T>` for a typed single document, both over the
//! [`crate::StorageEngine`] facade with serde JSON encoding.

mod typed;

pub use typed::{Collection, DocumentSlot, Record};
