//! Concordia CLI
//!
//! Read-only tools for inspecting a coordinator's data directory. Nothing
//! here modifies the store files; torn tails are reported, not truncated.
//!
//! # Commands
//!
//! - `inspect` - Display file sizes, store counts and the digest
//! - `verify` - Check every store file for corruption
//! - `dump-queue` - List messages awaiting delivery
//! - `dump-history` - List applied messages

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Concordia data directory tools.
#[derive(Parser)]
#[command(name = "concordia")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the data directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display file sizes, store counts and the digest
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check every store file for corruption
    Verify,

    /// List messages awaiting delivery, oldest first
    DumpQueue {
        /// Maximum number of messages to list
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List applied messages, most recent first
    DumpHistory {
        /// Maximum number of messages to list
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Data directory path required for inspect")?;
            debug!(path = %path.display(), "inspecting");
            commands::inspect::run(&path, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Data directory path required for verify")?;
            debug!(path = %path.display(), "verifying");
            commands::verify::run(&path)?;
        }
        Commands::DumpQueue { limit, format } => {
            let path = cli.path.ok_or("Data directory path required for dump-queue")?;
            commands::dump::run_queue(&path, limit, &format)?;
        }
        Commands::DumpHistory { limit, format } => {
            let path = cli.path.ok_or("Data directory path required for dump-history")?;
            commands::dump::run_history(&path, limit, &format)?;
        }
        Commands::Version => {
            println!("Concordia CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Concordia Core v{}", concordia_core::VERSION);
        }
    }

    Ok(())
}
