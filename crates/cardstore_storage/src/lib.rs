//! # cardstore Storage
//!
//! Backend strategy trait and key-value backends for cardstore.
//!
//! This crate provides the lowest-level storage abstraction for cardstore.
//! Backends are **opaque string stores** - they do not interpret the values
//! they hold.
//!
//! ## Design Principles
//!
//! - Backends are simple key-value stores (open, get, put, delete, list)
//! - No knowledge of segments, compression tags, or JSON records
//! - Every operation is async and may fail with an unavailable backend
//! - Must be `Send + Sync`; one handle is shared by every caller
//!
//! ## Available Backends
//!
//! - [`FileBackend`] - Primary structured store, one file per key
//! - [`FlatFileBackend`] - Legacy flat store with byte quotas
//! - [`InMemoryBackend`] - For testing and ephemeral storage
//! - [`FaultInjectingBackend`] - Wrapper that fails operations on demand

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod faulty;
mod file;
mod flat;
mod memory;

pub use backend::{BackendKind, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use faulty::FaultInjectingBackend;
pub use file::FileBackend;
pub use flat::{FlatFileBackend, DEFAULT_TOTAL_QUOTA, DEFAULT_VALUE_QUOTA};
pub use memory::InMemoryBackend;
