//! CLI definitions for Prime Launch.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use primelaunch_protocols::Address;

/// Prime Launch CLI.
#[derive(Parser)]
#[command(name = "primelaunch")]
#[command(about = "Discover and inspect deployed LBP managers")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml", global = true)]
    pub config: PathBuf,

    /// Deployment fixture (overrides `discovery.source`)
    #[arg(short, long, global = true, env = "PRIMELAUNCH_SOURCE")]
    pub source: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Discover every LBP manager and list the valid ones
    List {
        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Load one LBP manager and show its details
    Show {
        /// LBP manager address
        address: Address,
    },

    /// Validate the configuration file
    CheckConfig,
}
