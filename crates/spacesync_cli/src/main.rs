//! spacesync CLI
//!
//! Maintenance tools for spacesync store directories.
//!
//! # Commands
//!
//! - `create-space` - Provision a space
//! - `inspect` - Display per-space versions and entry counts
//! - `dump-journal` - Dump journal records for debugging
//! - `verify` - Check journal integrity and replay it

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// spacesync store tools.
#[derive(Parser)]
#[command(name = "spacesync")]
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

#[derive(Subcommand)]
enum Commands {
    /// Provision a new space
    CreateSpace {
        /// Space id (random six-character id if omitted)
        #[arg(long)]
        id: Option<String>,

        /// Initial version
        #[arg(long, default_value = "0")]
        version: u64,
    },

    /// Display per-space versions and entry counts
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Dump journal records for debugging
    DumpJournal {
        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify journal integrity
    Verify,

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
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::CreateSpace { id, version } => {
            let path = cli.path.ok_or("Store path required for create-space")?;
            commands::create_space::run(&path, id.as_deref(), version)?;
        }
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::DumpJournal { limit, format } => {
            let path = cli.path.ok_or("Store path required for dump-journal")?;
            commands::dump_journal::run(&path, limit, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Store path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Version => {
            println!("spacesync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("spacesync core v{}", spacesync_core::VERSION);
        }
    }

    Ok(())
}
