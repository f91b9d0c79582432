//! Check-config command handler.

use std::path::Path;

use tracing::info;

use crate::config::AppConfig;
use crate::exchange::create_registry;

/// Validate a configuration file and build its gateways.
///
/// # Errors
/// Returns the first configuration problem found.
pub fn run_check_config(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load(config_path)?;
    let registry = create_registry(&config.exchanges);

    info!(
        exchanges = ?registry.names(),
        order_poll_secs = config.order_poll_interval_secs,
        position_poll_secs = config.position_poll_interval_secs,
        call_timeout_secs = config.exchange_call_timeout_secs,
        store_dir = %config.store_dir.display(),
        "Configuration is valid"
    );
    println!(
        "{}: OK ({} exchange(s): {})",
        config_path.display(),
        registry.len(),
        registry.names().join(", ")
    );
    Ok(())
}
