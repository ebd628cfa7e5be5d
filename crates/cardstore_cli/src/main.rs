//! Cardstore CLI
//!
//! Command-line tools for inspecting and maintaining a cardstore directory.
//!
//! # Commands
//!
//! - `inspect` - List stored keys with their encoding and layout
//! - `verify` - Check segment consistency and find orphans
//! - `migrate` - Run the legacy-to-primary migration
//! - `sweep` - Remove orphaned segments
//! - `export` - Dump every logical value as JSON

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Cardstore command-line store tools.
#[derive(Parser)]
#[command(name = "cardstore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    dir: Option<PathBuf>,

    /// Records per segment when reading or writing collections
    #[arg(global = true, long)]
    segment_capacity: Option<usize>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List stored keys with their encoding and layout
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check segment consistency and find orphans
    Verify,

    /// Run the legacy-to-primary migration
    Migrate {
        /// Show what would be migrated without writing
        #[arg(short = 'n', long)]
        dry_run: bool,
    },

    /// Remove orphaned segments
    Sweep,

    /// Dump every logical value as JSON
    Export {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show version information
    Version,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let capacity = cli.segment_capacity;
    match cli.command {
        Commands::Inspect { format } => {
            let dir = cli.dir.ok_or("Store directory required for inspect")?;
            commands::inspect::run(&dir, capacity, &format).await?;
        }
        Commands::Verify => {
            let dir = cli.dir.ok_or("Store directory required for verify")?;
            commands::verify::run(&dir, capacity).await?;
        }
        Commands::Migrate { dry_run } => {
            let dir = cli.dir.ok_or("Store directory required for migrate")?;
            commands::migrate::run(&dir, capacity, dry_run).await?;
        }
        Commands::Sweep => {
            let dir = cli.dir.ok_or("Store directory required for sweep")?;
            commands::sweep::run(&dir, capacity).await?;
        }
        Commands::Export { output } => {
            let dir = cli.dir.ok_or("Store directory required for export")?;
            commands::export::run(&dir, capacity, output.as_deref()).await?;
        }
        Commands::Version => {
            println!("cardstore CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("cardstore core v{}", cardstore_core::VERSION);
        }
    }

    Ok(())
}
