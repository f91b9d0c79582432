//! CLI command handlers.
//!
//! This module contains the implementation for each CLI subcommand,
//! wiring configuration, stores, gateways and managers together.

mod check;
mod list;
mod run;

pub use check::run_check_config;
pub use list::{run_list_orders, run_list_positions};
pub use run::run_engine;
