//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use orderkeeper::api::Api;
use orderkeeper::exchange::{ExchangeRegistry, PaperExchange};
use orderkeeper::orders::{ManagedOrder, OrderManager, OrderSpec};
use orderkeeper::positions::{ManagedPosition, PositionManager, PositionSpec, Target};
use orderkeeper::scheduler::TickContext;
use orderkeeper::store::{Filter, MemoryStore, Record, RecordId, Store, StoreError};
use orderkeeper::types::{Direction, OrderType};
use orderkeeper::users::{UserDetails, UserManager};

/// Store wrapper that fails updates on demand.
///
/// `fail_updates_after(n)` lets the next `n` updates through and fails every
/// update after that until `heal()` is called. Reads always succeed.
pub struct FlakyStore<R: Record> {
    inner: MemoryStore<R>,
    failing: AtomicBool,
    allowed: AtomicUsize,
}

impl<R: Record> FlakyStore<R> {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            failing: AtomicBool::new(false),
            allowed: AtomicUsize::new(0),
        }
    }

    pub fn fail_updates_after(&self, allowed: usize) {
        self.allowed.store(allowed, Ordering::SeqCst);
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.failing.store(false, Ordering::SeqCst);
    }

    fn update_allowed(&self) -> bool {
        if !self.failing.load(Ordering::SeqCst) {
            return true;
        }
        self.allowed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl<R: Record> Store<R> for FlakyStore<R> {
    async fn insert(&self, record: R) -> Result<RecordId, StoreError> {
        self.inner.insert(record).await
    }

    async fn get(&self, id: &RecordId) -> Result<Option<R>, StoreError> {
        self.inner.get(id).await
    }

    async fn update(&self, id: &RecordId, patch: R::Patch) -> Result<R, StoreError> {
        if !self.update_allowed() {
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }
        self.inner.update(id, patch).await
    }

    async fn delete(&self, id: &RecordId) -> Result<(), StoreError> {
        self.inner.delete(id).await
    }

    async fn list(&self, filter: &Filter<R::Status>) -> Result<Vec<R>, StoreError> {
        self.inner.list(filter).await
    }
}

/// Both managers over in-memory stores and one paper venue named "paper".
pub struct Harness {
    pub paper: Arc<PaperExchange>,
    pub order_store: Arc<FlakyStore<ManagedOrder>>,
    pub position_store: Arc<FlakyStore<ManagedPosition>>,
    pub orders: Arc<OrderManager>,
    pub positions: Arc<PositionManager>,
    pub api: Api,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_exchange(PaperExchange::new("paper"))
    }

    pub fn with_exchange(paper: PaperExchange) -> Self {
        let paper = Arc::new(paper);
        let registry = Arc::new(ExchangeRegistry::new().with_gateway("paper", paper.clone()));
        let order_store: Arc<FlakyStore<ManagedOrder>> = Arc::new(FlakyStore::new());
        let position_store: Arc<FlakyStore<ManagedPosition>> = Arc::new(FlakyStore::new());
        let orders = Arc::new(OrderManager::with_defaults(order_store.clone(), registry));
        let positions = Arc::new(PositionManager::new(position_store.clone(), orders.clone()));
        let users = Arc::new(UserManager::new(Arc::new(MemoryStore::<UserDetails>::new())));
        let api = Api::new(orders.clone(), positions.clone(), users);
        Self {
            paper,
            order_store,
            position_store,
            orders,
            positions,
            api,
        }
    }

    pub async fn order_tick(&self) -> orderkeeper::orders::OrderTickReport {
        self.orders.reconcile(&TickContext::detached()).await
    }

    pub async fn position_tick(&self) -> orderkeeper::positions::PositionTickReport {
        self.positions.reconcile(&TickContext::detached()).await
    }

    pub async fn order(&self, id: &RecordId) -> ManagedOrder {
        self.api.get_managed_order(id.as_str()).await.unwrap()
    }
}

pub fn limit_order(price: Decimal, amount: Decimal) -> OrderSpec {
    OrderSpec {
        exchange: "paper".to_string(),
        pair: "BTC/USD".to_string(),
        direction: Direction::Long,
        leverage: dec!(1),
        price,
        amount,
        order_type: OrderType::Limit,
    }
}

pub fn market_order(amount: Decimal) -> OrderSpec {
    OrderSpec {
        order_type: OrderType::Market,
        ..limit_order(dec!(100), amount)
    }
}

pub fn position(entry_amount: Decimal, entry_price: Decimal) -> PositionSpec {
    PositionSpec {
        exchange: "paper".to_string(),
        pair: "ETH/USD".to_string(),
        direction: Direction::Long,
        leverage: dec!(2),
        entries: vec![Target {
            amount: entry_amount,
            target: entry_price,
        }],
        stoploss: dec!(120),
        targets: vec![
            Target {
                amount: dec!(0.5),
                target: dec!(150),
            },
            Target {
                amount: dec!(0.5),
                target: dec!(160),
            },
        ],
        rationale: "range breakout".to_string(),
    }
}
