//! Paper Exchange
//!
//! In-process simulated venue. Orders rest until driven by `fill`, `close`
//! or `cancel`; market orders can be filled immediately. Failure switches let
//! callers simulate an unreliable venue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{debug, info};

use super::{
    ExchangeError, ExchangeGateway, ExternalOrder, ExternalOrderStatus, NewOrder, OrderSide,
    PlacedOrder,
};

#[derive(Debug, Clone)]
struct PaperOrder {
    id: String,
    client_order_id: String,
    pair: String,
    side: OrderSide,
    amount: Decimal,
    price: Option<Decimal>,
    filled: Decimal,
    status: ExternalOrderStatus,
}

impl PaperOrder {
    fn to_external(&self, venue: &str) -> ExternalOrder {
        ExternalOrder {
            id: self.id.clone(),
            status: self.status,
            filled: self.filled,
            info: json!({
                "venue": venue,
                "clientOrderId": self.client_order_id,
                "pair": self.pair,
                "side": self.side,
                "amount": self.amount,
                "price": self.price,
            }),
        }
    }
}

/// Simulated venue.
pub struct PaperExchange {
    name: String,
    /// External id -> order
    orders: DashMap<String, PaperOrder>,
    /// Idempotency key -> external id of the first order placed with it
    client_ids: DashMap<String, String>,
    balances: DashMap<String, Decimal>,
    next_id: AtomicU64,
    placement_calls: AtomicUsize,
    fill_market_orders: bool,
    idempotent: bool,
    client_id_lookup: bool,
    fail_placements: AtomicBool,
    fail_queries: AtomicBool,
}

impl PaperExchange {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            orders: DashMap::new(),
            client_ids: DashMap::new(),
            balances: DashMap::new(),
            next_id: AtomicU64::new(1),
            placement_calls: AtomicUsize::new(0),
            fill_market_orders: true,
            idempotent: true,
            client_id_lookup: true,
            fail_placements: AtomicBool::new(false),
            fail_queries: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn with_market_fills(mut self, enabled: bool) -> Self {
        self.fill_market_orders = enabled;
        self
    }

    /// When disabled, every placement creates a new order even for a
    /// previously seen idempotency key.
    #[must_use]
    pub fn with_idempotency(mut self, enabled: bool) -> Self {
        self.idempotent = enabled;
        self
    }

    /// When disabled, `find_order_by_client_id` reports `Unsupported`.
    #[must_use]
    pub fn with_client_id_lookup(mut self, enabled: bool) -> Self {
        self.client_id_lookup = enabled;
        self
    }

    #[must_use]
    pub fn with_balance(self, currency: impl Into<String>, amount: Decimal) -> Self {
        self.balances.insert(currency.into(), amount);
        self
    }

    /// Make subsequent placement calls fail with a network error.
    pub fn set_fail_placements(&self, fail: bool) {
        self.fail_placements.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent status queries fail with a network error.
    pub fn set_fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    /// Number of placement calls received, successful or not.
    pub fn placement_calls(&self) -> usize {
        self.placement_calls.load(Ordering::SeqCst)
    }

    /// Number of orders resting or finished on the venue.
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// Number of venue orders created with this idempotency key.
    pub fn orders_for_client_id(&self, client_order_id: &str) -> usize {
        self.orders
            .iter()
            .filter(|o| o.client_order_id == client_order_id)
            .count()
    }

    /// Set the cumulative filled quantity of an open order.
    pub fn fill(&self, external_id: &str, filled: Decimal) -> Result<(), ExchangeError> {
        let mut order = self.open_order_mut(external_id)?;
        order.filled = filled.min(order.amount);
        debug!(venue = %self.name, external_id, filled = %order.filled, "Paper fill");
        Ok(())
    }

    /// Fill the remainder and close the order.
    pub fn close(&self, external_id: &str) -> Result<(), ExchangeError> {
        let mut order = self.open_order_mut(external_id)?;
        order.filled = order.amount;
        order.status = ExternalOrderStatus::Closed;
        info!(venue = %self.name, external_id, "Paper order closed");
        Ok(())
    }

    /// Cancel the order, keeping whatever was filled.
    pub fn cancel(&self, external_id: &str) -> Result<(), ExchangeError> {
        let mut order = self.open_order_mut(external_id)?;
        order.status = ExternalOrderStatus::Canceled;
        info!(venue = %self.name, external_id, "Paper order canceled");
        Ok(())
    }

    fn open_order_mut(
        &self,
        external_id: &str,
    ) -> Result<dashmap::mapref::one::RefMut<'_, String, PaperOrder>, ExchangeError> {
        let order = self
            .orders
            .get_mut(external_id)
            .ok_or_else(|| ExchangeError::OrderNotFound(external_id.to_string()))?;
        if order.status.is_terminal() {
            return Err(ExchangeError::Rejected(format!(
                "order {} is already {}",
                external_id, order.status
            )));
        }
        Ok(order)
    }

    fn place(&self, order: &NewOrder, price: Option<Decimal>) -> Result<PlacedOrder, ExchangeError> {
        self.placement_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_placements.load(Ordering::SeqCst) {
            return Err(ExchangeError::Network(format!(
                "{}: simulated placement failure",
                self.name
            )));
        }
        if order.amount <= Decimal::ZERO {
            return Err(ExchangeError::Rejected(format!(
                "invalid amount {}",
                order.amount
            )));
        }

        if self.idempotent {
            if let Some(existing) = self.client_ids.get(&order.client_order_id) {
                debug!(
                    venue = %self.name,
                    client_order_id = %order.client_order_id,
                    external_id = %*existing,
                    "Duplicate idempotency key, returning existing order"
                );
                return Ok(PlacedOrder {
                    id: existing.clone(),
                });
            }
        }

        let id = format!(
            "{}-{}",
            self.name,
            self.next_id.fetch_add(1, Ordering::SeqCst)
        );
        let mut paper = PaperOrder {
            id: id.clone(),
            client_order_id: order.client_order_id.clone(),
            pair: order.pair.clone(),
            side: order.side,
            amount: order.amount,
            price,
            filled: Decimal::ZERO,
            status: ExternalOrderStatus::Open,
        };
        if price.is_none() && self.fill_market_orders {
            paper.filled = paper.amount;
            paper.status = ExternalOrderStatus::Closed;
        }

        self.client_ids
            .entry(order.client_order_id.clone())
            .or_insert_with(|| id.clone());
        self.orders.insert(id.clone(), paper);

        info!(
            venue = %self.name,
            external_id = %id,
            pair = %order.pair,
            side = %order.side,
            amount = %order.amount,
            "Paper order placed"
        );
        Ok(PlacedOrder { id })
    }
}

#[async_trait]
impl ExchangeGateway for PaperExchange {
    async fn create_limit_order(
        &self,
        order: &NewOrder,
        price: Decimal,
    ) -> Result<PlacedOrder, ExchangeError> {
        if price <= Decimal::ZERO {
            self.placement_calls.fetch_add(1, Ordering::SeqCst);
            return Err(ExchangeError::Rejected(format!("invalid price {}", price)));
        }
        self.place(order, Some(price))
    }

    async fn create_market_order(&self, order: &NewOrder) -> Result<PlacedOrder, ExchangeError> {
        self.place(order, None)
    }

    async fn fetch_order(
        &self,
        external_id: &str,
        _pair: &str,
    ) -> Result<ExternalOrder, ExchangeError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(ExchangeError::Network(format!(
                "{}: simulated query failure",
                self.name
            )));
        }
        self.orders
            .get(external_id)
            .map(|o| o.to_external(&self.name))
            .ok_or_else(|| ExchangeError::OrderNotFound(external_id.to_string()))
    }

    async fn find_order_by_client_id(
        &self,
        client_order_id: &str,
        _pair: &str,
    ) -> Result<Option<ExternalOrder>, ExchangeError> {
        if !self.client_id_lookup {
            return Err(ExchangeError::Unsupported("find_order_by_client_id"));
        }
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(ExchangeError::Network(format!(
                "{}: simulated query failure",
                self.name
            )));
        }
        let found = self
            .client_ids
            .get(client_order_id)
            .and_then(|id| self.orders.get(id.value()).map(|o| o.to_external(&self.name)));
        Ok(found)
    }

    async fn fetch_balance(&self) -> Result<HashMap<String, Decimal>, ExchangeError> {
        Ok(self
            .balances
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn new_order(client_order_id: &str) -> NewOrder {
        NewOrder {
            client_order_id: client_order_id.to_string(),
            pair: "BTC/USD".to_string(),
            side: OrderSide::Buy,
            amount: dec!(2),
            leverage: dec!(1),
        }
    }

    #[tokio::test]
    async fn test_limit_order_lifecycle() {
        let venue = PaperExchange::new("paper");
        let placed = venue
            .create_limit_order(&new_order("k1"), dec!(100))
            .await
            .unwrap();

        let order = venue.fetch_order(&placed.id, "BTC/USD").await.unwrap();
        assert_eq!(order.status, ExternalOrderStatus::Open);
        assert_eq!(order.filled, dec!(0));

        venue.fill(&placed.id, dec!(1)).unwrap();
        let order = venue.fetch_order(&placed.id, "BTC/USD").await.unwrap();
        assert_eq!(order.filled, dec!(1));

        venue.close(&placed.id).unwrap();
        let order = venue.fetch_order(&placed.id, "BTC/USD").await.unwrap();
        assert_eq!(order.status, ExternalOrderStatus::Closed);
        assert_eq!(order.filled, dec!(2));

        assert!(venue.cancel(&placed.id).is_err());
    }

    #[tokio::test]
    async fn test_market_order_fills_immediately() {
        let venue = PaperExchange::new("paper");
        let placed = venue.create_market_order(&new_order("k1")).await.unwrap();
        let order = venue.fetch_order(&placed.id, "BTC/USD").await.unwrap();
        assert_eq!(order.status, ExternalOrderStatus::Closed);
        assert_eq!(order.filled, dec!(2));

        let resting = PaperExchange::new("paper").with_market_fills(false);
        let placed = resting.create_market_order(&new_order("k1")).await.unwrap();
        let order = resting.fetch_order(&placed.id, "BTC/USD").await.unwrap();
        assert_eq!(order.status, ExternalOrderStatus::Open);
    }

    #[tokio::test]
    async fn test_idempotency_key() {
        let venue = PaperExchange::new("paper");
        let a = venue.create_limit_order(&new_order("k1"), dec!(100)).await.unwrap();
        let b = venue.create_limit_order(&new_order("k1"), dec!(100)).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(venue.order_count(), 1);
        assert_eq!(venue.placement_calls(), 2);

        let found = venue.find_order_by_client_id("k1", "BTC/USD").await.unwrap();
        assert_eq!(found.map(|o| o.id), Some(a.id));
        assert!(venue
            .find_order_by_client_id("k2", "BTC/USD")
            .await
            .unwrap()
            .is_none());

        let loose = PaperExchange::new("paper").with_idempotency(false);
        loose.create_limit_order(&new_order("k1"), dec!(100)).await.unwrap();
        loose.create_limit_order(&new_order("k1"), dec!(100)).await.unwrap();
        assert_eq!(loose.orders_for_client_id("k1"), 2);
    }

    #[tokio::test]
    async fn test_failure_switches() {
        let venue = PaperExchange::new("paper").with_client_id_lookup(false);
        venue.set_fail_placements(true);
        let err = venue
            .create_limit_order(&new_order("k1"), dec!(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Network(_)));
        assert_eq!(venue.order_count(), 0);

        venue.set_fail_placements(false);
        let placed = venue.create_limit_order(&new_order("k1"), dec!(100)).await.unwrap();

        venue.set_fail_queries(true);
        assert!(venue.fetch_order(&placed.id, "BTC/USD").await.is_err());
        assert_eq!(
            venue.find_order_by_client_id("k1", "BTC/USD").await,
            Err(ExchangeError::Unsupported("find_order_by_client_id"))
        );
    }

    #[tokio::test]
    async fn test_balance() {
        let venue = PaperExchange::new("paper").with_balance("USD", dec!(1000));
        let balances = venue.fetch_balance().await.unwrap();
        assert_eq!(balances.get("USD"), Some(&dec!(1000)));
    }
}
