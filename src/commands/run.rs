//! Run command handler.
//!
//! Starts the order and position reconciliation loops over the JSON store
//! and stops them on Ctrl+C once the in-flight ticks have completed.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::api::Api;
use crate::cli::SeedFile;
use crate::config::AppConfig;
use crate::exchange::create_registry;
use crate::metrics;
use crate::orders::{ManagedOrder, OrderManager};
use crate::positions::{ManagedPosition, PositionManager};
use crate::scheduler::{ReconciliationScheduler, ShutdownSignal};
use crate::store::JsonFileStore;
use crate::users::{UserDetails, UserManager};

/// Run both reconciliation loops until Ctrl+C.
///
/// # Arguments
/// * `config_path` - Path to the JSON configuration file
/// * `seed_path` - Optional file of specs to submit before the loops start
///
/// # Errors
/// Returns error if configuration, store loading or the seed file fails.
/// Per-record reconciliation errors never end the run.
pub async fn run_engine(
    config_path: &Path,
    seed_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load(config_path)?;
    let registry = Arc::new(create_registry(&config.exchanges));

    info!("--- orderkeeper: starting ---");
    info!(
        exchanges = ?registry.names(),
        store_dir = %config.store_dir.display(),
        "Configuration loaded"
    );

    let order_store = Arc::new(JsonFileStore::<ManagedOrder>::open(&config.store_dir).await?);
    let position_store = Arc::new(JsonFileStore::<ManagedPosition>::open(&config.store_dir).await?);
    let user_store = Arc::new(JsonFileStore::<UserDetails>::open(&config.store_dir).await?);

    let orders = Arc::new(OrderManager::new(
        order_store,
        registry,
        config.order_manager_config(),
    ));
    let positions = Arc::new(PositionManager::new(position_store, orders.clone()));
    let users = Arc::new(UserManager::new(user_store));

    if let Some(path) = seed_path {
        let seed = SeedFile::load(path)?;
        submit_seed(&Api::new(orders.clone(), positions.clone(), users), seed).await;
    }

    let shutdown = ShutdownSignal::new();
    let order_loop = ReconciliationScheduler::new(orders.config().poll_interval)
        .spawn(orders.clone(), shutdown.listener());
    let position_loop = ReconciliationScheduler::new(config.position_poll_interval())
        .spawn(positions, shutdown.listener());

    info!("Reconciliation loops running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, initiating shutdown");
    shutdown.trigger();

    let (order_ticks, position_ticks) = tokio::join!(order_loop, position_loop);
    info!(
        order_ticks = order_ticks?,
        position_ticks = position_ticks?,
        "Shutdown complete"
    );
    debug!(metrics = %metrics::gather_metrics(), "Final metrics");

    Ok(())
}

/// Submit seed specs; a rejected spec is logged and skipped.
async fn submit_seed(api: &Api, seed: SeedFile) {
    if seed.is_empty() {
        warn!("Seed file contains no users, orders or positions");
        return;
    }

    for details in seed.users {
        let username = details.username.clone();
        match api.create_user(details).await {
            Ok(id) => info!(user_id = %id, username = %username, "Seeded user"),
            Err(e) => warn!(username = %username, code = e.code, error = %e.message, "Seed user rejected"),
        }
    }

    for spec in seed.orders {
        let pair = spec.pair.clone();
        match api.create_managed_order(spec).await {
            Ok(id) => info!(order_id = %id, pair = %pair, "Seeded order"),
            Err(e) => warn!(pair = %pair, code = e.code, error = %e.message, "Seed order rejected"),
        }
    }

    for spec in seed.positions {
        let pair = spec.pair.clone();
        match api.open_managed_position(spec).await {
            Ok(id) => info!(position_id = %id, pair = %pair, "Seeded position"),
            Err(e) => warn!(pair = %pair, code = e.code, error = %e.message, "Seed position rejected"),
        }
    }
}
