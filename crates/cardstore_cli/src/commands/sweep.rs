//! Sweep command implementation.

use super::store::Store;
use std::path::Path;

/// Removes orphaned segments from the store and its backups.
pub async fn run(
    path: &Path,
    segment_capacity: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::existing(path, segment_capacity)?;
    let engine = store.engine();
    let init = engine.init().await;
    if init.degraded {
        println!("Primary store unavailable, sweeping legacy store only");
    }

    let report = engine.sweep_orphans().await?;
    println!("Orphan sweep");
    println!("============");
    for key in &report.active {
        println!("  removed {key} ({})", init.active);
    }
    for key in &report.mirror {
        println!("  removed {key} (backup)");
    }
    println!();
    println!("✓ Removed {} orphaned segment(s)", report.total());
    Ok(())
}
