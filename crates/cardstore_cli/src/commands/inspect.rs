//! Inspect command implementation.

use super::store::{describe_all, print_table, KeyReport, Store};
use serde::Serialize;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store directory.
    pub path: String,
    /// Whether the primary store opened.
    pub primary_available: bool,
    /// Whether the legacy store opened.
    pub legacy_available: bool,
    /// Bytes held by the legacy store, which has a quota.
    pub legacy_bytes: usize,
    /// Keys in the primary store.
    pub primary: Vec<KeyReport>,
    /// Keys in the legacy store, including backups.
    pub legacy: Vec<KeyReport>,
}

/// Runs the inspect command.
pub async fn run(
    path: &Path,
    segment_capacity: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::existing(path, segment_capacity)?;
    let (primary_available, legacy_available) = store.open_raw().await;

    let result = InspectResult {
        path: path.display().to_string(),
        primary_available,
        legacy_available,
        legacy_bytes: store.legacy.used_bytes(),
        primary: if primary_available {
            describe_all(store.primary.as_ref()).await?
        } else {
            Vec::new()
        },
        legacy: if legacy_available {
            describe_all(store.legacy.as_ref()).await?
        } else {
            Vec::new()
        },
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Store: {}", result.path);
    println!(
        "  primary: {}",
        if result.primary_available { "available" } else { "unavailable" }
    );
    println!(
        "  legacy:  {} ({} bytes)",
        if result.legacy_available { "available" } else { "unavailable" },
        result.legacy_bytes
    );
    println!();
    print_table("Primary store", &result.primary);
    print_table("Legacy store", &result.legacy);
}
