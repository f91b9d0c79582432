//! CLI argument parsing using clap.
//!
//! This module defines the command-line interface for orderkeeper,
//! including all subcommands and their arguments.

mod config;

pub use config::{SeedError, SeedFile};

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// orderkeeper - order/position reconciliation engine
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Set the verbosity level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    pub verbose: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true, default_value_t = false)]
    pub log_json: bool,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the order and position reconciliation loops until Ctrl+C
    Run {
        /// Path to the JSON configuration file
        #[arg(short, long)]
        config: PathBuf,
        /// Optional JSON file of order/position specs to submit on startup
        #[arg(long)]
        seed: Option<PathBuf>,
    },

    /// Print open managed orders from a store directory
    ListOrders {
        /// Directory holding the JSON store
        #[arg(long, default_value = "data")]
        store_dir: PathBuf,
    },

    /// Print open managed positions from a store directory
    ListPositions {
        /// Directory holding the JSON store
        #[arg(long, default_value = "data")]
        store_dir: PathBuf,
    },

    /// Validate a configuration file and exit
    CheckConfig {
        /// Path to the JSON configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from([
            "orderkeeper",
            "run",
            "--config",
            "config.json",
            "--seed",
            "seed.json",
            "--log-json",
        ]);
        assert!(cli.log_json);
        assert_eq!(cli.verbose, "info");
        match cli.command {
            Commands::Run { config, seed } => {
                assert_eq!(config, PathBuf::from("config.json"));
                assert_eq!(seed, Some(PathBuf::from("seed.json")));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_list_orders_default_dir() {
        let cli = Cli::parse_from(["orderkeeper", "list-orders", "--verbose", "debug"]);
        assert_eq!(cli.verbose, "debug");
        assert!(matches!(
            cli.command,
            Commands::ListOrders { store_dir } if store_dir == PathBuf::from("data")
        ));
    }
}
