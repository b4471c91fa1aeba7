//! Replica CLI
//!
//! Command-line tools for Replica record stores.
//!
//! # Commands
//!
//! - `inspect` - Display store statistics and the continuation token
//! - `verify` - Verify log integrity and store invariants
//! - `compact` - Rewrite the record log as a single snapshot
//! - `dump-log` - Dump record log frames for debugging

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Replica command-line store tools.
#[derive(Parser)]
#[command(name = "replica")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable text
    Text,
    /// Pretty-printed JSON
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Display store statistics and the continuation token
    Inspect {
        /// List the ids of pending records
        #[arg(long)]
        pending: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Verify log integrity and store invariants
    Verify,

    /// Rewrite the record log as a single snapshot
    Compact {
        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Dump record log frames for debugging
    DumpLog {
        /// Maximum number of frames to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
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
    tracing::debug!(path = ?cli.path, "starting");

    match cli.command {
        Commands::Inspect { pending, format } => {
            let path = cli.path.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, pending, format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Store path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Compact { dry_run } => {
            let path = cli.path.ok_or("Store path required for compact")?;
            commands::compact::run(&path, dry_run)?;
        }
        Commands::DumpLog { limit, format } => {
            let path = cli.path.ok_or("Store path required for dump-log")?;
            commands::dump_log::run(&path, limit, format)?;
        }
        Commands::Version => {
            println!("Replica CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Replica Core v{}", replica_core::VERSION);
        }
    }

    Ok(())
}
