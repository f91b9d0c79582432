//! Exchange Abstraction Layer
//!
//! This module provides the venue-agnostic gateway trait consumed by the
//! `OrderManager`, the registry of configured gateways, and a factory that
//! builds gateways from configuration. Wire protocol, authentication and rate
//! limiting live behind the trait.

pub mod paper;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::types::OrderSide;
pub use paper::PaperExchange;

/// Errors returned by an exchange gateway.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExchangeError {
    /// Transport-level failure; the request may or may not have reached the venue
    #[error("Network error: {0}")]
    Network(String),

    /// Venue refused the request
    #[error("Rejected by exchange: {0}")]
    Rejected(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// Gateway does not implement this capability
    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("Exchange call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Exchange error: {0}")]
    Other(String),
}

/// Order as sent to a venue.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    /// Idempotency key; a venue that supports it must not create a second
    /// order for a key it has already seen
    pub client_order_id: String,
    pub pair: String,
    pub side: OrderSide,
    pub amount: Decimal,
    pub leverage: Decimal,
}

/// Venue acknowledgement of a placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedOrder {
    pub id: String,
}

/// Order status as reported by the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExternalOrderStatus {
    Open,
    Closed,
    Canceled,
    Expired,
    Rejected,
}

impl ExternalOrderStatus {
    /// Returns true if the venue will not change this order any further.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Open)
    }
}

impl std::fmt::Display for ExternalOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::Canceled => write!(f, "canceled"),
            Self::Expired => write!(f, "expired"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

impl std::str::FromStr for ExternalOrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            "canceled" | "cancelled" => Ok(Self::Canceled),
            "expired" => Ok(Self::Expired),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("Unknown order status: {}", s)),
        }
    }
}

/// Venue view of an order.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalOrder {
    pub id: String,
    pub status: ExternalOrderStatus,
    pub filled: Decimal,
    /// Raw venue payload, kept for diagnostics
    pub info: serde_json::Value,
}

/// Core trait for order placement and query - venue implementations must provide this
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Place a limit order at `price`
    async fn create_limit_order(
        &self,
        order: &NewOrder,
        price: Decimal,
    ) -> Result<PlacedOrder, ExchangeError>;

    /// Place a market order
    async fn create_market_order(&self, order: &NewOrder) -> Result<PlacedOrder, ExchangeError>;

    /// Query an order by its venue id
    async fn fetch_order(&self, external_id: &str, pair: &str)
        -> Result<ExternalOrder, ExchangeError>;

    /// Look up an order by idempotency key.
    ///
    /// `Ok(None)` means the venue has definitely not seen the key.
    async fn find_order_by_client_id(
        &self,
        _client_order_id: &str,
        _pair: &str,
    ) -> Result<Option<ExternalOrder>, ExchangeError> {
        Err(ExchangeError::Unsupported("find_order_by_client_id"))
    }

    /// Free balance per currency
    async fn fetch_balance(&self) -> Result<HashMap<String, Decimal>, ExchangeError> {
        Err(ExchangeError::Unsupported("fetch_balance"))
    }
}

/// Bound an exchange call by `limit`.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, ExchangeError>
where
    F: Future<Output = Result<T, ExchangeError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| ExchangeError::Timeout(limit))?
}

/// Configured gateways, keyed by exchange name.
///
/// Built once at startup and shared by reference with both managers.
#[derive(Clone, Default)]
pub struct ExchangeRegistry {
    gateways: HashMap<String, Arc<dyn ExchangeGateway>>,
}

impl ExchangeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration.
    #[must_use]
    pub fn with_gateway(mut self, name: impl Into<String>, gateway: Arc<dyn ExchangeGateway>) -> Self {
        self.register(name, gateway);
        self
    }

    pub fn register(&mut self, name: impl Into<String>, gateway: Arc<dyn ExchangeGateway>) {
        self.gateways.insert(name.into(), gateway);
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn ExchangeGateway>> {
        self.gateways.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.gateways.contains_key(name)
    }

    /// Sorted list of configured names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.gateways.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.gateways.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gateways.is_empty()
    }
}

impl std::fmt::Debug for ExchangeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeRegistry")
            .field("exchanges", &self.names())
            .finish()
    }
}

/// Gateway implementation selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    /// In-process simulated venue
    Paper,
}

/// Configuration for one exchange connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeConfig {
    pub kind: GatewayKind,
    /// Paper only: fill and close market orders immediately
    #[serde(default = "default_true")]
    pub fill_market_orders: bool,
    /// Paper only: honour idempotency keys
    #[serde(default = "default_true")]
    pub idempotent: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            kind: GatewayKind::Paper,
            fill_market_orders: true,
            idempotent: true,
        }
    }
}

/// Factory function to create a gateway from configuration
pub fn create_gateway(name: &str, config: &ExchangeConfig) -> Arc<dyn ExchangeGateway> {
    match config.kind {
        GatewayKind::Paper => Arc::new(
            PaperExchange::new(name)
                .with_market_fills(config.fill_market_orders)
                .with_idempotency(config.idempotent),
        ),
    }
}

/// Build the registry for every configured exchange.
pub fn create_registry(exchanges: &HashMap<String, ExchangeConfig>) -> ExchangeRegistry {
    exchanges
        .iter()
        .fold(ExchangeRegistry::new(), |registry, (name, config)| {
            registry.with_gateway(name.clone(), create_gateway(name, config))
        })
}
