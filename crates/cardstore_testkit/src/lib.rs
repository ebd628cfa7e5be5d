//! # cardstore Testkit
//!
//! Test utilities for cardstore.
//!
//! This crate provides:
//! - Engine fixtures over fault-injectable in-memory or on-disk backends
//! - Record builders for the flashcard domain
//! - Property-based test generators using proptest
//! - A model harness that checks engine reads against expected contents
//!
//! The cross-crate property and scenario tests live in this crate's
//! `tests/` directory.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cardstore_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn falls_back_to_backup() {
//!     let t = TestEngine::new();
//!     t.put_document("user", user("u1", "Ana")).await.unwrap();
//!     let next = t.restart();
//!     next.primary.fail_open(true);
//!     assert!(next.get_document("user").await.value.is_some());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
