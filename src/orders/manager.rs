//! Order manager: public operations over managed orders.
//!
//! Records are created here and advanced only by the reconciliation tick
//! in `reconciler.rs`. Readers never write.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use super::types::{ManagedOrder, OrderSpec};
use crate::error::ManagerError;
use crate::exchange::ExchangeRegistry;
use crate::store::{Filter, RecordId, Store};

/// Timing configuration for the order loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderManagerConfig {
    /// Interval between reconciliation ticks
    pub poll_interval: Duration,
    /// Upper bound on every exchange call made by the tick
    pub call_timeout: Duration,
}

impl Default for OrderManagerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            call_timeout: Duration::from_secs(15),
        }
    }
}

/// Owns the `ManagedOrder` lifecycle.
///
/// # Architecture
///
/// - `create_managed_order()` validates and persists a record in `UNINITIALIZED`
/// - The reconciliation tick places at most one pending order per tick and
///   refreshes the status of every placed, open order
/// - The store is the only shared state; this manager is its sole writer
///   for the `managedOrders` collection
pub struct OrderManager {
    pub(super) store: Arc<dyn Store<ManagedOrder>>,
    pub(super) exchanges: Arc<ExchangeRegistry>,
    pub(super) config: OrderManagerConfig,
}

impl OrderManager {
    pub fn new(
        store: Arc<dyn Store<ManagedOrder>>,
        exchanges: Arc<ExchangeRegistry>,
        config: OrderManagerConfig,
    ) -> Self {
        Self {
            store,
            exchanges,
            config,
        }
    }

    /// Create with default timing.
    pub fn with_defaults(store: Arc<dyn Store<ManagedOrder>>, exchanges: Arc<ExchangeRegistry>) -> Self {
        Self::new(store, exchanges, OrderManagerConfig::default())
    }

    pub fn config(&self) -> &OrderManagerConfig {
        &self.config
    }

    /// Whether orders can be created for this exchange.
    pub fn supports_exchange(&self, exchange: &str) -> bool {
        self.exchanges.contains(exchange)
    }

    /// Persist a new order intent.
    ///
    /// Fails with `Configuration` if the exchange is not configured and with
    /// `Validation` if the spec is malformed; nothing is persisted in either
    /// case. No exchange call is made here: placement happens on a later tick.
    pub async fn create_managed_order(&self, spec: OrderSpec) -> Result<RecordId, ManagerError> {
        if !self.exchanges.contains(&spec.exchange) {
            return Err(ManagerError::unsupported_exchange(&spec.exchange));
        }

        let exchange = spec.exchange.clone();
        let pair = spec.pair.clone();
        let id = self.store.insert(ManagedOrder::new(spec, Utc::now())).await?;

        info!(
            order_id = %id,
            exchange = %exchange,
            pair = %pair,
            "Managed order created"
        );
        Ok(id)
    }

    /// All orders with `closed = false`, in store order.
    pub async fn list_open_managed_orders(&self) -> Result<Vec<ManagedOrder>, ManagerError> {
        let orders = self.store.list(&Filter::open()).await?;
        debug!(count = orders.len(), "Listed open managed orders");
        Ok(orders)
    }

    pub async fn get_managed_order(&self, id: &RecordId) -> Result<Option<ManagedOrder>, ManagerError> {
        Ok(self.store.get(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::PaperExchange;
    use crate::orders::{ManagedOrder, OrderStatus};
    use crate::store::MemoryStore;
    use crate::types::{Direction, OrderType};
    use rust_decimal_macros::dec;

    fn manager() -> OrderManager {
        let registry = ExchangeRegistry::new()
            .with_gateway("coinbasepro", Arc::new(PaperExchange::new("coinbasepro")));
        OrderManager::with_defaults(Arc::new(MemoryStore::<ManagedOrder>::new()), Arc::new(registry))
    }

    fn spec(exchange: &str) -> OrderSpec {
        OrderSpec {
            exchange: exchange.to_string(),
            pair: "BTC/USD".to_string(),
            direction: Direction::Long,
            leverage: dec!(1),
            price: dec!(137.0),
            amount: dec!(15),
            order_type: OrderType::Limit,
        }
    }

    #[tokio::test]
    async fn test_create_managed_order() {
        let manager = manager();
        let id = manager.create_managed_order(spec("coinbasepro")).await.unwrap();

        let order = manager.get_managed_order(&id).await.unwrap().unwrap();
        assert_eq!(order.id, id);
        assert_eq!(order.status, OrderStatus::Uninitialized);
        assert!(!order.placed);
        assert!(!order.closed);
        assert_eq!(order.filled_amount, dec!(0));
        assert_eq!(order.placement_attempts, 0);
    }

    #[tokio::test]
    async fn test_unconfigured_exchange_persists_nothing() {
        let manager = manager();
        let err = manager.create_managed_order(spec("binance")).await.unwrap_err();
        assert!(matches!(err, ManagerError::Configuration(_)));
        assert!(manager.list_open_managed_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_spec_persists_nothing() {
        let manager = manager();
        let mut bad = spec("coinbasepro");
        bad.amount = dec!(0);

        let err = manager.create_managed_order(bad).await.unwrap_err();
        assert!(matches!(err, ManagerError::Validation(_)));
        assert!(manager.list_open_managed_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_unknown_order() {
        let manager = manager();
        let missing = manager
            .get_managed_order(&RecordId::new("nope"))
            .await
            .unwrap();
        assert!(missing.is_none());
    }
}
