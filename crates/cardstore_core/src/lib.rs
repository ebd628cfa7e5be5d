//! # cardstore Core
//!
//! The storage engine for cardstore.
//!
//! This crate provides:
//! - [`StorageEngine`], the facade the domain layer calls
//! - A TTL read cache in front of the backend
//! - The backup mirror of critical keys and the read fallback to it
//! - One-time migration from the legacy store
//! - [`SyncBridge`] for call sites that cannot await
//! - Periodic maintenance jobs (health probe, orphan sweep)
//! - Typed collections and the application's record shapes
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cardstore_core::{EngineConfig, StorageEngine};
//! use cardstore_storage::{FileBackend, FlatFileBackend};
//! use std::sync::Arc;
//!
//! let engine = Arc::new(StorageEngine::new(
//!     Arc::new(FileBackend::new("data/primary")),
//!     Arc::new(FlatFileBackend::new("data/legacy.json")),
//!     EngineConfig::default(),
//! ));
//! engine.init().await;
//!
//! engine.put_collection("decks", vec![serde_json::json!({ "id": "d1" })]).await?;
//! let decks = engine.get_collection("decks").await;
//! if decks.is_degraded() {
//!     // served from the backup mirror or a default
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backup;
mod bridge;
mod cache;
mod collection;
mod config;
mod engine;
mod error;
mod jobs;
pub mod keys;
pub mod layout;
mod migration;
pub mod model;
mod stats;

pub use backup::{BackupMirror, MirrorOutcome};
pub use bridge::{Snapshot, SyncBridge};
pub use cache::{FillTicket, TtlCache};
pub use collection::{Collection, DocumentSlot, Record};
pub use config::{EngineConfig, EntryKind, LegacyEntry};
pub use engine::{Fetched, InitReport, Origin, StorageEngine, SweepReport};
pub use error::{CoreError, CoreResult};
pub use jobs::{Maintenance, PeriodicJob};
pub use layout::{CollectionRead, EntryDescription, Shape, WriteSummary};
pub use migration::{MigrationManager, MigrationReport, MigrationState, PlannedEntry};
pub use stats::{EngineStats, StatsSnapshot};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
