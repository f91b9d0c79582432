//! Position manager.
//!
//! Decomposes a position intent into managed orders. Only the first entry is
//! realised; targets and stop-loss stay on the record for later stages.
//!
//! Entering a position is at-least-once: if the entry order is created but the
//! position write fails, the next tick creates a second entry order.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use super::types::{ManagedPosition, PositionPatch, PositionSpec, PositionStatus};
use crate::error::{ManagerError, ReconciliationError};
use crate::metrics;
use crate::orders::{OrderManager, OrderSpec};
use crate::scheduler::{Reconcile, TickContext};
use crate::store::{Filter, Match, RecordId, Store};
use crate::types::OrderType;
use crate::validation::ValidationError;

/// Summary of one position tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionTickReport {
    /// Positions moved to ENTRIES_PLACED
    pub entered: usize,
    /// Positions left UNINITIALIZED for retry
    pub errors: usize,
    pub cancelled: bool,
}

/// Owns the `ManagedPosition` lifecycle.
pub struct PositionManager {
    store: Arc<dyn Store<ManagedPosition>>,
    orders: Arc<OrderManager>,
}

/// Limit order for the position's first entry.
pub fn entry_order_spec(spec: &PositionSpec) -> Option<OrderSpec> {
    let entry = spec.entries.first()?;
    Some(OrderSpec {
        exchange: spec.exchange.clone(),
        pair: spec.pair.clone(),
        direction: spec.direction,
        leverage: spec.leverage,
        price: entry.target,
        amount: entry.amount,
        order_type: OrderType::Limit,
    })
}

impl PositionManager {
    pub fn new(store: Arc<dyn Store<ManagedPosition>>, orders: Arc<OrderManager>) -> Self {
        Self { store, orders }
    }

    /// Persist a new position intent in UNINITIALIZED.
    ///
    /// Fails with `Configuration` for an unknown exchange and `Validation` for a
    /// malformed spec; nothing is persisted in either case.
    pub async fn open_managed_position(&self, spec: PositionSpec) -> Result<RecordId, ManagerError> {
        if !self.orders.supports_exchange(&spec.exchange) {
            return Err(ManagerError::unsupported_exchange(&spec.exchange));
        }

        let exchange = spec.exchange.clone();
        let pair = spec.pair.clone();
        let id = self
            .store
            .insert(ManagedPosition::new(spec, Utc::now()))
            .await?;

        info!(position_id = %id, exchange = %exchange, pair = %pair, "Managed position opened");
        Ok(id)
    }

    pub async fn list_open_managed_positions(&self) -> Result<Vec<ManagedPosition>, ManagerError> {
        Ok(self.store.list(&Filter::open()).await?)
    }

    pub async fn get_managed_position(
        &self,
        id: &RecordId,
    ) -> Result<Option<ManagedPosition>, ManagerError> {
        Ok(self.store.get(id).await?)
    }

    /// Run one reconciliation tick.
    #[instrument(name = "position_tick", skip(self, ctx), fields(tick = ctx.tick))]
    pub async fn reconcile(&self, ctx: &TickContext) -> PositionTickReport {
        let mut report = PositionTickReport::default();

        let filter = Filter::open().status(Match::Eq(PositionStatus::Uninitialized));
        let pending = match self.store.list(&filter).await {
            Ok(positions) => positions,
            Err(e) => {
                error!(error = %e, "Failed to list uninitialized positions, skipping tick");
                report.errors += 1;
                return report;
            }
        };

        for position in &pending {
            if ctx.is_cancelled() {
                info!("Shutdown requested, stopping position sweep");
                report.cancelled = true;
                break;
            }

            match self.enter_position(position).await {
                Ok(order_id) => {
                    report.entered += 1;
                    info!(
                        position_id = %position.id,
                        order_id = %order_id,
                        status = %PositionStatus::EntriesPlaced,
                        "Position entries placed"
                    );
                }
                Err(e) => {
                    report.errors += 1;
                    warn!(
                        position_id = %position.id,
                        error = %e,
                        "Failed to enter position, will retry next tick"
                    );
                }
            }
        }

        debug!(pending = pending.len(), entered = report.entered, "Position sweep done");
        report
    }

    async fn enter_position(&self, position: &ManagedPosition) -> Result<RecordId, ReconciliationError> {
        let spec = &position.original_position;
        let order_spec = entry_order_spec(spec).ok_or_else(|| {
            ManagerError::from(ValidationError::new("position has no entries"))
        })?;

        let order_id = self.orders.create_managed_order(order_spec).await?;

        if let Err(e) = self
            .store
            .update(&position.id, PositionPatch::entries_placed(vec![order_id.clone()]))
            .await
        {
            // Known gap: the retry creates another entry order
            error!(
                position_id = %position.id,
                order_id = %order_id,
                error = %e,
                "Entry order created but position not updated"
            );
            return Err(e.into());
        }

        metrics::record_position_entered(&spec.exchange);
        Ok(order_id)
    }
}

#[async_trait::async_trait]
impl Reconcile for PositionManager {
    type Report = PositionTickReport;

    fn name(&self) -> &'static str {
        "positions"
    }

    async fn tick(&self, ctx: &TickContext) -> PositionTickReport {
        self.reconcile(ctx).await
    }
}
