//! Migrate command implementation.

use super::store::Store;
use cardstore_core::{EntryKind, MigrationManager};
use std::path::Path;
use tracing::info;

/// Runs the migrate command.
///
/// With `dry_run`, lists what a pass would move without writing anything.
/// Otherwise starts an engine over the store, which migrates on startup.
pub async fn run(
    path: &Path,
    segment_capacity: Option<usize>,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::at(path, segment_capacity);
    info!("Migrating legacy store in {:?}", path);

    if dry_run {
        return preview(&store).await;
    }

    let report = store.engine().init().await;
    if report.degraded {
        return Err(format!(
            "Primary store unavailable: {}",
            report.primary_error.unwrap_or_default()
        )
        .into());
    }
    let Some(migration) = report.migration else {
        return Err("Migration did not run".into());
    };

    println!("Migration");
    println!("=========");
    if migration.already_completed {
        println!("  Already completed, nothing to do");
        return Ok(());
    }
    for key in &migration.migrated {
        println!("  migrated  {key}");
    }
    for key in &migration.skipped {
        println!("  skipped   {key} (empty)");
    }
    for warning in &migration.warnings {
        println!("  warning   {warning}");
    }
    match migration.failure {
        Some(failure) => Err(format!("Migration failed: {failure}").into()),
        None => {
            println!();
            println!("✓ Migration completed ({} keys)", migration.migrated.len());
            Ok(())
        }
    }
}

async fn preview(store: &Store) -> Result<(), Box<dyn std::error::Error>> {
    use cardstore_storage::StorageBackend;

    let (primary_available, legacy_available) = store.open_raw().await;
    if !legacy_available {
        return Err("Legacy store could not be opened".into());
    }
    if primary_available
        && MigrationManager::is_flag_set(store.primary.as_ref(), &store.config).await?
    {
        println!("Migration already completed");
        return Ok(());
    }

    let planned = MigrationManager::preview(store.legacy.as_ref(), &store.config).await?;
    println!("Migration plan (dry run)");
    println!("========================");
    for item in &planned {
        let kind = match item.entry.kind {
            EntryKind::Collection => "collection",
            EntryKind::Document => "document",
        };
        match item.records {
            Some(n) => println!(
                "  {:<16} -> {:<16} {kind:<10} {n} record(s)",
                item.entry.legacy_key, item.entry.target_key
            ),
            None => println!(
                "  {:<16} -> {:<16} {kind:<10} empty",
                item.entry.legacy_key, item.entry.target_key
            ),
        }
    }
    if !primary_available {
        println!();
        println!(
            "Note: primary store ({}) could not be opened",
            store.primary.kind()
        );
    }
    Ok(())
}
