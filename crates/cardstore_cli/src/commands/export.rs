//! Export command implementation.

use super::store::Store;
use std::path::Path;

/// Writes every logical value as one JSON object, to `output` or stdout.
pub async fn run(
    path: &Path,
    segment_capacity: Option<usize>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::existing(path, segment_capacity)?;
    let engine = store.engine();
    engine.init().await;

    let values = engine.export().await?;
    let json = serde_json::to_string_pretty(&values)?;
    match output {
        Some(out) => {
            std::fs::write(out, json)?;
            eprintln!("Exported {} key(s) to {}", values.len(), out.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
