//! One-time migration from the legacy store to the primary store.
//!
//! On startup the engine checks the migration flag in the primary store.
//! If it is unset, every configured [`LegacyEntry`] is read from the legacy
//! store (segmented or not, tagged or untagged) and written to the primary
//! store as a full overwrite. The flag is written only after every entry
//! succeeded, so a failed pass is simply repeated on the next startup and
//! cannot duplicate records.
//!
//! ```text
//! NotStarted ──run──► InProgress ──all ok──► Completed
//!      ▲                  │
//!      └──── any error ───┘
//! ```
//!
//! Legacy data is never deleted.

use crate::backup::BackupMirror;
use crate::config::{EngineConfig, EntryKind, LegacyEntry};
use crate::error::{CoreError, CoreResult};
use crate::layout;
use cardstore_storage::StorageBackend;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{info, warn};

/// Where the migration state machine is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    /// No pass has completed.
    NotStarted,
    /// A pass is running.
    InProgress,
    /// The flag is set; nothing left to do.
    Completed,
}

/// The outcome of one migration pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// State after the pass.
    pub state: MigrationState,
    /// Target keys written during this pass.
    pub migrated: Vec<String>,
    /// Legacy keys that held nothing.
    pub skipped: Vec<String>,
    /// Consistency problems in legacy collections that were migrated
    /// best-effort.
    pub warnings: Vec<String>,
    /// Why the pass stopped, if it failed.
    pub failure: Option<String>,
    /// True if the flag was already set and no work was done.
    pub already_completed: bool,
}

impl MigrationReport {
    fn new(state: MigrationState) -> Self {
        Self {
            state,
            migrated: Vec::new(),
            skipped: Vec::new(),
            warnings: Vec::new(),
            failure: None,
            already_completed: false,
        }
    }

    /// Returns true if the flag is set after this pass.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.state == MigrationState::Completed
    }
}

/// A legacy entry as it would be migrated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEntry {
    /// The configured entry.
    pub entry: LegacyEntry,
    /// Record count for collections, `Some(1)` for documents, `None` if
    /// the legacy key is empty.
    pub records: Option<usize>,
}

/// Runs migration passes and tracks their state.
#[derive(Debug)]
pub struct MigrationManager {
    state: RwLock<MigrationState>,
}

impl Default for MigrationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrationManager {
    /// Creates a manager in the `NotStarted` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MigrationState::NotStarted),
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> MigrationState {
        *self.state.read()
    }

    /// Reports whether the flag in `primary` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the primary store cannot be read.
    pub async fn is_flag_set(primary: &dyn StorageBackend, config: &EngineConfig) -> CoreResult<bool> {
        let flag = layout::read_value(primary, &config.migration_flag_key).await?;
        Ok(matches!(flag, Some(Value::Bool(true))))
    }

    /// Runs one migration pass.
    ///
    /// Never returns an error: failures are logged and reported in
    /// [`MigrationReport::failure`], and the state returns to
    /// `NotStarted`.
    pub async fn run(
        &self,
        legacy: &dyn StorageBackend,
        primary: &dyn StorageBackend,
        config: &EngineConfig,
        mirror: Option<&BackupMirror>,
    ) -> MigrationReport {
        {
            let mut state = self.state.write();
            match *state {
                MigrationState::Completed => {
                    let mut report = MigrationReport::new(MigrationState::Completed);
                    report.already_completed = true;
                    return report;
                }
                MigrationState::InProgress => {
                    let mut report = MigrationReport::new(MigrationState::InProgress);
                    report.failure = Some("a migration pass is already running".into());
                    return report;
                }
                MigrationState::NotStarted => *state = MigrationState::InProgress,
            }
        }

        let mut report = MigrationReport::new(MigrationState::InProgress);
        match Self::pass(legacy, primary, config, mirror, &mut report).await {
            Ok(true) => {
                report.already_completed = true;
                report.state = MigrationState::Completed;
            }
            Ok(false) => {
                info!(
                    migrated = report.migrated.len(),
                    skipped = report.skipped.len(),
                    "legacy migration completed"
                );
                report.state = MigrationState::Completed;
            }
            Err(e) => {
                warn!(error = %e, "legacy migration failed, will retry on next startup");
                report.failure = Some(e.to_string());
                report.state = MigrationState::NotStarted;
            }
        }
        *self.state.write() = report.state;
        report
    }

    /// Returns `Ok(true)` if the flag was already set.
    async fn pass(
        legacy: &dyn StorageBackend,
        primary: &dyn StorageBackend,
        config: &EngineConfig,
        mirror: Option<&BackupMirror>,
        report: &mut MigrationReport,
    ) -> CoreResult<bool> {
        if Self::is_flag_set(primary, config).await? {
            return Ok(true);
        }
        info!(entries = config.legacy_entries.len(), "starting legacy migration");

        for entry in &config.legacy_entries {
            let key = entry.legacy_key.as_str();
            let target = entry.target_key.as_str();
            match entry.kind {
                EntryKind::Collection => {
                    let read = layout::read_collection(legacy, key)
                        .await
                        .map_err(|e| CoreError::migration_failed(key, e))?;
                    let Some(read) = read else {
                        report.skipped.push(key.to_string());
                        continue;
                    };
                    for warning in &read.warnings {
                        report.warnings.push(format!("{key}: {warning}"));
                    }
                    layout::write_collection(
                        primary,
                        target,
                        &read.records,
                        config.segment_capacity,
                        &config.compression,
                    )
                    .await
                    .map_err(|e| CoreError::migration_failed(key, e))?;
                    if let Some(mirror) = mirror {
                        mirror.mirror_collection(target, &read.records).await;
                    }
                }
                EntryKind::Document => {
                    let value = layout::read_value(legacy, key)
                        .await
                        .map_err(|e| CoreError::migration_failed(key, e))?;
                    let Some(value) = value else {
                        report.skipped.push(key.to_string());
                        continue;
                    };
                    layout::write_value(primary, target, &value, &config.compression)
                        .await
                        .map_err(|e| CoreError::migration_failed(key, e))?;
                    if let Some(mirror) = mirror {
                        mirror.mirror_document(target, &value).await;
                    }
                }
            }
            report.migrated.push(target.to_string());
        }

        layout::write_value(
            primary,
            &config.migration_flag_key,
            &Value::Bool(true),
            &config.compression,
        )
        .await
        .map_err(|e| CoreError::migration_failed(config.migration_flag_key.as_str(), e))?;
        Ok(false)
    }

    /// Lists what a pass would migrate, without writing anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the legacy store cannot be read.
    pub async fn preview(
        legacy: &dyn StorageBackend,
        config: &EngineConfig,
    ) -> CoreResult<Vec<PlannedEntry>> {
        let mut planned = Vec::with_capacity(config.legacy_entries.len());
        for entry in &config.legacy_entries {
            let records = match entry.kind {
                EntryKind::Collection => layout::read_collection(legacy, &entry.legacy_key)
                    .await?
                    .map(|r| r.records.len()),
                EntryKind::Document => layout::read_value(legacy, &entry.legacy_key)
                    .await?
                    .map(|_| 1),
            };
            planned.push(PlannedEntry {
                entry: entry.clone(),
                records,
            });
        }
        Ok(planned)
    }
}
