//! CLI argument definitions using clap
//!
//! Commands:
//! - aerosync status --config <path>
//! - aerosync pending --config <path>
//! - aerosync metadata --config <path> [--table <name>]
//! - aerosync verify --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// aerosync - inspect the sync state of a data directory
#[derive(Parser, Debug)]
#[command(name = "aerosync")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Summarize rows, metadata, queue and tokens
    Status {
        /// Path to configuration file
        #[arg(long, default_value = "./aerosync.json")]
        config: PathBuf,
    },

    /// List pending changes in push order
    Pending {
        /// Path to configuration file
        #[arg(long, default_value = "./aerosync.json")]
        config: PathBuf,
    },

    /// Dump sync metadata entries
    Metadata {
        /// Path to configuration file
        #[arg(long, default_value = "./aerosync.json")]
        config: PathBuf,

        /// Only entries of this table
        #[arg(long)]
        table: Option<String>,
    },

    /// Check the sync store for inconsistencies
    Verify {
        /// Path to configuration file
        #[arg(long, default_value = "./aerosync.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
