//! Verify command implementation.

use super::store::{describe_all, Store};
use cardstore_codec::parse_segment_key;
use cardstore_storage::StorageBackend;
use std::collections::BTreeMap;
use std::path::Path;

/// Verification result for one backend.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of logical keys checked.
    pub keys_checked: usize,
    /// Keys that decoded cleanly.
    pub valid_keys: usize,
    /// Segment keys no metadata accounts for.
    pub orphans: Vec<String>,
    /// List of errors found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.orphans.is_empty() && self.errors.is_empty()
    }
}

/// Runs the verify command.
pub async fn run(
    path: &Path,
    segment_capacity: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::existing(path, segment_capacity)?;
    let (primary_available, legacy_available) = store.open_raw().await;
    println!("Verifying store at {}", path.display());
    println!();

    let mut ok = true;
    if primary_available {
        let result = verify_backend(store.primary.as_ref()).await?;
        print_result("Primary store", &result);
        ok &= result.is_ok();
    } else {
        println!("Primary store could not be opened");
        ok = false;
    }
    if legacy_available {
        let result = verify_backend(store.legacy.as_ref()).await?;
        print_result("Legacy store", &result);
        ok &= result.is_ok();
    } else {
        println!("Legacy store could not be opened");
        ok = false;
    }

    println!();
    if ok {
        println!("✓ Store verification passed");
        Ok(())
    } else {
        println!("✗ Store verification failed");
        Err("Verification failed".into())
    }
}

async fn verify_backend(
    backend: &dyn StorageBackend,
) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let mut result = VerifyResult::default();
    let reports = describe_all(backend).await?;
    let mut segment_counts = BTreeMap::new();

    for report in &reports {
        result.keys_checked += 1;
        if report.problems.is_empty() {
            result.valid_keys += 1;
        }
        for problem in &report.problems {
            result.errors.push(format!("{}: {problem}", report.key));
        }
        segment_counts.insert(report.key.clone(), report.segments.unwrap_or(0));
    }

    for key in backend.list_keys().await? {
        if let Some((owner, index)) = parse_segment_key(&key) {
            if index >= segment_counts.get(owner).copied().unwrap_or(0) {
                result.orphans.push(key);
            }
        }
    }
    Ok(result)
}

fn print_result(name: &str, result: &VerifyResult) {
    println!("{name}:");
    println!("  Keys checked: {}", result.keys_checked);
    println!("  Valid keys:   {}", result.valid_keys);
    println!("  Orphaned segments: {}", result.orphans.len());
    for orphan in &result.orphans {
        println!("    - {orphan}");
    }
    if !result.errors.is_empty() {
        println!("  Errors:");
        for error in &result.errors {
            println!("    - {error}");
        }
    }
}
