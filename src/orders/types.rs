//! Core types for order management.
//!
//! `OrderSpec` is the immutable intent submitted by a caller; `ManagedOrder`
//! is the persisted lifecycle record the `OrderManager` drives towards the
//! venue.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::store::{Record, RecordId};
use crate::types::{Direction, OrderType};
use crate::validation::{self, Validate, ValidationError};

/// Order intent. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSpec {
    /// Configured exchange name (e.g., "coinbasepro")
    pub exchange: String,
    /// Trading pair (e.g., "BTC/USD")
    pub pair: String,
    pub direction: Direction,
    pub leverage: Decimal,
    /// Limit price; informational for market orders
    pub price: Decimal,
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub order_type: OrderType,
}

impl Validate for OrderSpec {
    fn validate(&self) -> Result<(), ValidationError> {
        validation::exchange_name(&self.exchange)?;
        validation::non_empty("pair", &self.pair)?;
        validation::non_negative("leverage", self.leverage)?;
        validation::positive("price", self.price)?;
        validation::positive("amount", self.amount)?;
        Ok(())
    }
}

/// Order lifecycle states.
///
/// ```text
/// UNINITIALIZED ──> ORDER_REQUESTED ──> ORDER_FILLED
///       │                 ^
///       └──> PLACEMENT_FAILED (retried)
/// ```
///
/// ORDER_PARTIALLY_FILLED is part of the stored vocabulary and may move on
/// to ORDER_FILLED, but the refresh never enters it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Persisted, not yet sent to the venue
    Uninitialized,
    /// Last placement attempt failed; will be retried
    PlacementFailed,
    /// Accepted by the venue, external id known
    OrderRequested,
    /// Some quantity executed; accepted when reading stored records
    OrderPartiallyFilled,
    /// Venue reported a positive fill, or closed the order
    OrderFilled,
}

impl OrderStatus {
    /// Returns true if the order still needs to be placed on the venue.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Uninitialized | Self::PlacementFailed)
    }

    /// Returns true if the venue knows this order.
    pub fn is_on_exchange(&self) -> bool {
        matches!(
            self,
            Self::OrderRequested | Self::OrderPartiallyFilled | Self::OrderFilled
        )
    }

    /// Whether a record in this status may move to `next`.
    ///
    /// Self-transitions are allowed so a patch may update other fields
    /// without touching the status.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match self {
            Uninitialized => matches!(next, Uninitialized | OrderRequested | PlacementFailed),
            PlacementFailed => matches!(next, PlacementFailed | OrderRequested),
            OrderRequested => matches!(
                next,
                OrderRequested | OrderPartiallyFilled | OrderFilled
            ),
            OrderPartiallyFilled => matches!(next, OrderPartiallyFilled | OrderFilled),
            OrderFilled => next == OrderFilled,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "UNINITIALIZED"),
            Self::PlacementFailed => write!(f, "PLACEMENT_FAILED"),
            Self::OrderRequested => write!(f, "ORDER_REQUESTED"),
            Self::OrderPartiallyFilled => write!(f, "ORDER_PARTIALLY_FILLED"),
            Self::OrderFilled => write!(f, "ORDER_FILLED"),
        }
    }
}

/// Persisted order lifecycle record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedOrder {
    /// Store-assigned id
    #[serde(default)]
    pub id: RecordId,
    pub original_order: OrderSpec,
    pub created_timestamp: DateTime<Utc>,
    pub updated_timestamp: DateTime<Utc>,
    pub status: OrderStatus,
    /// Set once the venue has acknowledged the order
    pub placed: bool,
    /// Terminal: no further reconciliation
    pub closed: bool,
    /// Venue-assigned id, empty until placed
    pub external_id: String,
    pub filled_amount: Decimal,
    /// Placement calls started so far, bumped before each call
    #[serde(default)]
    pub placement_attempts: u32,
    /// Diagnostic context from the last failure
    #[serde(default)]
    pub last_error: Option<String>,
}

impl ManagedOrder {
    /// Create a new, not yet inserted, order record in `UNINITIALIZED`.
    #[must_use]
    pub fn new(spec: OrderSpec, now: DateTime<Utc>) -> Self {
        Self {
            id: RecordId::default(),
            original_order: spec,
            created_timestamp: now,
            updated_timestamp: now,
            status: OrderStatus::Uninitialized,
            placed: false,
            closed: false,
            external_id: String::new(),
            filled_amount: Decimal::ZERO,
            placement_attempts: 0,
            last_error: None,
        }
    }

    /// Idempotency key sent with every placement of this order.
    ///
    /// Derived from the record id, so every retry reuses it.
    pub fn client_order_id(&self) -> String {
        format!("ok-{}", self.id)
    }

    /// Status implied by a fill quantity reported by the venue.
    ///
    /// Any execution marks the order ORDER_FILLED; it stays open and keeps
    /// being refreshed until the venue reports it closed.
    pub fn status_for_fill(&self, filled: Decimal) -> OrderStatus {
        if filled > Decimal::ZERO {
            OrderStatus::OrderFilled
        } else {
            self.status
        }
    }
}

impl Validate for ManagedOrder {
    fn validate(&self) -> Result<(), ValidationError> {
        self.original_order.validate()?;
        validation::non_negative("filledAmount", self.filled_amount)?;
        if self.placed && self.external_id.is_empty() {
            return Err(ValidationError::new("placed order requires externalId"));
        }
        if self.status.is_on_exchange() && !self.placed {
            return Err(ValidationError::new(format!(
                "status {} requires placed = true",
                self.status
            )));
        }
        if self.status.is_pending() && self.placed {
            return Err(ValidationError::new(format!(
                "status {} contradicts placed = true",
                self.status
            )));
        }
        Ok(())
    }
}

/// Partial update to a `ManagedOrder`.
///
/// `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub placed: Option<bool>,
    pub closed: Option<bool>,
    pub external_id: Option<String>,
    pub filled_amount: Option<Decimal>,
    pub placement_attempts: Option<u32>,
    pub last_error: Option<Option<String>>,
}

impl OrderPatch {
    /// Venue accepted the order.
    pub fn requested(external_id: impl Into<String>) -> Self {
        Self {
            status: Some(OrderStatus::OrderRequested),
            placed: Some(true),
            external_id: Some(external_id.into()),
            last_error: Some(None),
            ..Default::default()
        }
    }

    /// Placement attempt failed.
    pub fn placement_failed(reason: impl Into<String>) -> Self {
        Self {
            status: Some(OrderStatus::PlacementFailed),
            last_error: Some(Some(reason.into())),
            ..Default::default()
        }
    }

    /// Write-ahead marker recorded before a placement call.
    pub fn attempt(placement_attempts: u32) -> Self {
        Self {
            placement_attempts: Some(placement_attempts),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl Record for ManagedOrder {
    const COLLECTION: &'static str = "managedOrders";
    type Status = OrderStatus;
    type Patch = OrderPatch;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn assign_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn status(&self) -> OrderStatus {
        self.status
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn apply(&mut self, patch: OrderPatch) -> Result<(), ValidationError> {
        if self.closed {
            return Err(ValidationError::new(format!(
                "order {} is closed and cannot be modified",
                self.id
            )));
        }

        if let Some(next) = patch.status {
            if !self.status.can_transition_to(next) {
                return Err(ValidationError::new(format!(
                    "invalid transition for order {}: {} -> {}",
                    self.id, self.status, next
                )));
            }
            // Entering ORDER_REQUESTED must carry the venue id in the same write
            if next == OrderStatus::OrderRequested && self.status != OrderStatus::OrderRequested {
                let has_external_id = patch
                    .external_id
                    .as_deref()
                    .map(|id| !id.is_empty())
                    .unwrap_or(false);
                if !has_external_id || patch.placed != Some(true) {
                    return Err(ValidationError::new(format!(
                        "order {} cannot enter {} without externalId and placed = true",
                        self.id, next
                    )));
                }
            }
        }

        if patch.placed == Some(false) && self.placed {
            return Err(ValidationError::new(format!(
                "order {} is already placed",
                self.id
            )));
        }

        if let Some(external_id) = &patch.external_id {
            if self.placed && *external_id != self.external_id {
                return Err(ValidationError::new(format!(
                    "order {} already has externalId {}",
                    self.id, self.external_id
                )));
            }
        }

        if let Some(attempts) = patch.placement_attempts {
            if attempts < self.placement_attempts {
                return Err(ValidationError::new(format!(
                    "placementAttempts cannot decrease ({} -> {})",
                    self.placement_attempts, attempts
                )));
            }
        }

        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(placed) = patch.placed {
            self.placed = placed;
        }
        if let Some(closed) = patch.closed {
            self.closed = closed;
        }
        if let Some(external_id) = patch.external_id {
            self.external_id = external_id;
        }
        if let Some(filled) = patch.filled_amount {
            self.filled_amount = filled;
        }
        if let Some(attempts) = patch.placement_attempts {
            self.placement_attempts = attempts;
        }
        if let Some(last_error) = patch.last_error {
            self.last_error = last_error;
        }
        self.updated_timestamp = Utc::now();

        Ok(())
    }
}
