//! Order reconciliation with the exchange.
//!
//! One tick runs two steps, in this order:
//!
//! 1. **Single-flight placement**: at most one pending order (PLACEMENT_FAILED
//!    before UNINITIALIZED, oldest first) is sent to its venue.
//! 2. **Status refresh**: every placed, open order is queried independently;
//!    a failed query leaves the record unchanged for the next tick.
//!
//! # Duplicate placement
//!
//! Placement and the local write of the venue id cannot be made atomic. The
//! tick closes that gap with a write-ahead counter and an idempotency key:
//!
//! - `placementAttempts` is bumped in the store *before* the venue is called;
//!   if that write fails nothing is sent
//! - every placement carries `client_order_id`, derived from the record id
//! - an order with `placementAttempts > 0` is first looked up by that key and,
//!   if the venue already has it, the venue id is adopted instead of placing

use tracing::{debug, error, info, instrument, warn};

use super::manager::OrderManager;
use super::types::{ManagedOrder, OrderPatch, OrderStatus};
use crate::error::ReconciliationError;
use crate::exchange::{with_timeout, ExchangeError, ExternalOrder, ExternalOrderStatus, NewOrder};
use crate::metrics;
use crate::scheduler::{Reconcile, TickContext};
use crate::store::{Filter, RecordId};
use crate::types::OrderType;

/// What the placement step did this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementOutcome {
    /// Venue accepted a new order
    Placed { order_id: RecordId, external_id: String },
    /// An earlier attempt had reached the venue; its id was adopted
    Adopted { order_id: RecordId, external_id: String },
    /// Recorded as PLACEMENT_FAILED
    Failed { order_id: RecordId, reason: String },
    /// The attempt could not be recorded, so nothing was sent
    Deferred { order_id: RecordId, reason: String },
    /// Venue has the order but the id could not be persisted; recovered by
    /// idempotency key on a later tick
    Unrecorded { order_id: RecordId, external_id: String },
}

impl PlacementOutcome {
    pub fn order_id(&self) -> &RecordId {
        match self {
            Self::Placed { order_id, .. }
            | Self::Adopted { order_id, .. }
            | Self::Failed { order_id, .. }
            | Self::Deferred { order_id, .. }
            | Self::Unrecorded { order_id, .. } => order_id,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Placed { .. } => "placed",
            Self::Adopted { .. } => "adopted",
            Self::Failed { .. } => "failed",
            Self::Deferred { .. } => "deferred",
            Self::Unrecorded { .. } => "unrecorded",
        }
    }
}

/// Summary of one order tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderTickReport {
    pub placement: Option<PlacementOutcome>,
    /// Status queries answered by the venue
    pub refreshed: usize,
    /// Records written by the refresh step
    pub updated: usize,
    /// Store or venue failures (records left unchanged)
    pub errors: usize,
    /// Tick stopped early on shutdown
    pub cancelled: bool,
}

/// Pick the single order to place this tick.
///
/// PLACEMENT_FAILED takes priority over UNINITIALIZED, then oldest first;
/// ties keep store order.
pub(crate) fn select_for_placement(orders: &[ManagedOrder]) -> Option<&ManagedOrder> {
    orders
        .iter()
        .filter(|o| !o.closed && o.status.is_pending())
        .min_by_key(|o| (o.status != OrderStatus::PlacementFailed, o.created_timestamp))
}

/// Changes implied by the venue's view of a placed order. Empty if none.
pub(crate) fn refresh_patch(order: &ManagedOrder, external: &ExternalOrder) -> OrderPatch {
    let mut patch = OrderPatch::default();
    let mut status = order.status;

    if external.filled != order.filled_amount {
        patch.filled_amount = Some(external.filled);
        let by_fill = order.status_for_fill(external.filled);
        if order.status.can_transition_to(by_fill) {
            status = by_fill;
        }
    }

    match external.status {
        ExternalOrderStatus::Open => {}
        ExternalOrderStatus::Closed => {
            status = OrderStatus::OrderFilled;
            patch.closed = Some(true);
        }
        ExternalOrderStatus::Canceled
        | ExternalOrderStatus::Expired
        | ExternalOrderStatus::Rejected => {
            patch.closed = Some(true);
            patch.last_error = Some(Some(format!("venue reported order {}", external.status)));
        }
    }

    if status != order.status {
        patch.status = Some(status);
    }
    patch
}

impl OrderManager {
    /// Run one reconciliation tick.
    ///
    /// Never fails: per-record errors are logged, counted in the report and
    /// retried on the next tick.
    #[instrument(name = "order_tick", skip(self, ctx), fields(tick = ctx.tick))]
    pub async fn reconcile(&self, ctx: &TickContext) -> OrderTickReport {
        let mut report = OrderTickReport::default();

        let open = match self.store.list(&Filter::open()).await {
            Ok(orders) => orders,
            Err(e) => {
                error!(error = %e, "Failed to list open orders, skipping tick");
                report.errors += 1;
                return report;
            }
        };

        if ctx.is_cancelled() {
            report.cancelled = true;
            return report;
        }

        // 1. Single-flight placement
        if let Some(order) = select_for_placement(&open) {
            let outcome = self.place_order(order).await;
            match &outcome {
                PlacementOutcome::Placed { .. } | PlacementOutcome::Adopted { .. } => {}
                _ => report.errors += 1,
            }
            report.placement = Some(outcome);
        }

        // 2. Status refresh. The snapshot predates placement, so an order
        //    placed above is first queried on the next tick.
        for order in open.iter().filter(|o| o.placed) {
            if ctx.is_cancelled() {
                info!("Shutdown requested, stopping status refresh");
                report.cancelled = true;
                break;
            }

            match self.refresh_order(order).await {
                Ok(changed) => {
                    report.refreshed += 1;
                    if changed {
                        report.updated += 1;
                    }
                }
                Err(e) => {
                    report.errors += 1;
                    warn!(
                        order_id = %order.id,
                        external_id = %order.external_id,
                        error = %e,
                        "Status refresh failed, will retry next tick"
                    );
                }
            }
        }

        report
    }

    async fn place_order(&self, order: &ManagedOrder) -> PlacementOutcome {
        let spec = &order.original_order;
        let gateway = match self.exchanges.lookup(&spec.exchange) {
            Some(gateway) => gateway,
            None => {
                let reason = ReconciliationError::UnknownExchange(spec.exchange.clone());
                return self.record_failure(order, reason.to_string()).await;
            }
        };

        // Outbox write: no venue call unless the attempt is on record
        let attempt = order.placement_attempts + 1;
        if let Err(e) = self.store.update(&order.id, OrderPatch::attempt(attempt)).await {
            error!(
                order_id = %order.id,
                error = %e,
                "Could not record placement attempt, not placing"
            );
            let outcome = PlacementOutcome::Deferred {
                order_id: order.id.clone(),
                reason: e.to_string(),
            };
            metrics::record_placement(&spec.exchange, outcome.label());
            return outcome;
        }

        let client_order_id = order.client_order_id();
        let timeout = self.config.call_timeout;

        if order.placement_attempts > 0 {
            let lookup = with_timeout(
                timeout,
                gateway.find_order_by_client_id(&client_order_id, &spec.pair),
            )
            .await;
            match lookup {
                Ok(Some(existing)) => {
                    info!(
                        order_id = %order.id,
                        external_id = %existing.id,
                        "Earlier placement reached the venue, adopting it"
                    );
                    return self.record_placed(order, existing.id, true).await;
                }
                Ok(None) => {
                    debug!(order_id = %order.id, "No earlier placement on the venue");
                }
                Err(ExchangeError::Unsupported(_)) => {
                    warn!(
                        order_id = %order.id,
                        exchange = %spec.exchange,
                        client_order_id = %client_order_id,
                        "Gateway cannot look up idempotency keys, re-placing with the same key"
                    );
                }
                Err(e) => {
                    return self
                        .record_failure(order, format!("recovery lookup failed: {}", e))
                        .await;
                }
            }
        }

        let new_order = NewOrder {
            client_order_id,
            pair: spec.pair.clone(),
            side: spec.direction.entry_side(),
            amount: spec.amount,
            leverage: spec.leverage,
        };

        info!(
            order_id = %order.id,
            exchange = %spec.exchange,
            pair = %spec.pair,
            order_type = %spec.order_type,
            attempt,
            "Placing order"
        );

        let result = match spec.order_type {
            OrderType::Limit => {
                with_timeout(timeout, gateway.create_limit_order(&new_order, spec.price)).await
            }
            OrderType::Market => with_timeout(timeout, gateway.create_market_order(&new_order)).await,
        };

        match result {
            Ok(placed) => self.record_placed(order, placed.id, false).await,
            Err(e) => self.record_failure(order, e.to_string()).await,
        }
    }

    async fn record_placed(
        &self,
        order: &ManagedOrder,
        external_id: String,
        adopted: bool,
    ) -> PlacementOutcome {
        let exchange = &order.original_order.exchange;
        let outcome = match self
            .store
            .update(&order.id, OrderPatch::requested(external_id.clone()))
            .await
        {
            Ok(_) => {
                metrics::record_transition(&OrderStatus::OrderRequested.to_string());
                info!(
                    order_id = %order.id,
                    external_id = %external_id,
                    status = %OrderStatus::OrderRequested,
                    "Order placed"
                );
                if adopted {
                    PlacementOutcome::Adopted {
                        order_id: order.id.clone(),
                        external_id,
                    }
                } else {
                    PlacementOutcome::Placed {
                        order_id: order.id.clone(),
                        external_id,
                    }
                }
            }
            Err(e) => {
                error!(
                    order_id = %order.id,
                    external_id = %external_id,
                    error = %e,
                    "Order is on the venue but its id could not be stored, will recover by idempotency key"
                );
                PlacementOutcome::Unrecorded {
                    order_id: order.id.clone(),
                    external_id,
                }
            }
        };
        metrics::record_placement(exchange, outcome.label());
        outcome
    }

    async fn record_failure(&self, order: &ManagedOrder, reason: String) -> PlacementOutcome {
        let exchange = &order.original_order.exchange;
        warn!(
            order_id = %order.id,
            exchange = %exchange,
            reason = %reason,
            "Order placement failed, will retry on a later tick"
        );

        match self
            .store
            .update(&order.id, OrderPatch::placement_failed(reason.clone()))
            .await
        {
            Ok(_) => metrics::record_transition(&OrderStatus::PlacementFailed.to_string()),
            Err(e) => error!(order_id = %order.id, error = %e, "Failed to record placement failure"),
        }

        metrics::record_placement(exchange, "failed");
        PlacementOutcome::Failed {
            order_id: order.id.clone(),
            reason,
        }
    }

    /// Query one placed order and persist what changed.
    ///
    /// Returns whether a write was issued.
    async fn refresh_order(&self, order: &ManagedOrder) -> Result<bool, ReconciliationError> {
        let spec = &order.original_order;
        let gateway = self
            .exchanges
            .lookup(&spec.exchange)
            .ok_or_else(|| ReconciliationError::UnknownExchange(spec.exchange.clone()))?;

        let external = with_timeout(
            self.config.call_timeout,
            gateway.fetch_order(&order.external_id, &spec.pair),
        )
        .await;
        metrics::record_status_query(&spec.exchange, external.is_ok());
        let external = external?;

        let patch = refresh_patch(order, &external);
        if patch.is_empty() {
            debug!(order_id = %order.id, status = %order.status, "Order unchanged");
            return Ok(false);
        }

        let next_status = patch.status;
        let updated = self.store.update(&order.id, patch).await?;
        if let Some(status) = next_status {
            metrics::record_transition(&status.to_string());
        }

        info!(
            order_id = %order.id,
            external_id = %order.external_id,
            venue_status = %external.status,
            status = %updated.status,
            filled = %updated.filled_amount,
            closed = updated.closed,
            "Order status refreshed"
        );
        Ok(true)
    }
}

#[async_trait::async_trait]
impl Reconcile for OrderManager {
    type Report = OrderTickReport;

    fn name(&self) -> &'static str {
        "orders"
    }

    async fn tick(&self, ctx: &TickContext) -> OrderTickReport {
        self.reconcile(ctx).await
    }
}
