//! Core types for position management.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::store::{Record, RecordId};
use crate::types::Direction;
use crate::validation::{self, Validate, ValidationError};

/// Tolerance for the target portions summing to one.
const PORTION_SUM_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 6);

/// A size/price pair, used for entries and take-profit points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// Entry size, or portion of the position for take-profit targets
    pub amount: Decimal,
    /// Price
    pub target: Decimal,
}

impl Validate for Target {
    fn validate(&self) -> Result<(), ValidationError> {
        validation::positive("amount", self.amount)?;
        validation::positive("target", self.target)?;
        Ok(())
    }
}

/// Position intent. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSpec {
    pub exchange: String,
    pub pair: String,
    pub direction: Direction,
    pub leverage: Decimal,
    /// Only the first entry is realised as an order
    pub entries: Vec<Target>,
    pub stoploss: Decimal,
    /// Take-profit points; `amount` is the portion of the position
    #[serde(default)]
    pub targets: Vec<Target>,
    pub rationale: String,
}

impl Validate for PositionSpec {
    fn validate(&self) -> Result<(), ValidationError> {
        validation::exchange_name(&self.exchange)?;
        validation::non_empty("pair", &self.pair)?;
        validation::non_negative("leverage", self.leverage)?;
        validation::positive("stoploss", self.stoploss)?;
        validation::non_empty("rationale", &self.rationale)?;

        if self.entries.is_empty() {
            return Err(ValidationError::new("entries must not be empty"));
        }
        self.entries.validate()?;
        self.targets.validate()?;

        if !self.targets.is_empty() {
            if let Some(t) = self.targets.iter().find(|t| t.amount > Decimal::ONE) {
                return Err(ValidationError::new(format!(
                    "target portion {} exceeds 1",
                    t.amount
                )));
            }
            let sum: Decimal = self.targets.iter().map(|t| t.amount).sum();
            if (sum - Decimal::ONE).abs() > PORTION_SUM_TOLERANCE {
                return Err(ValidationError::new(format!(
                    "target portions must sum to 1, got {}",
                    sum
                )));
            }
        }
        Ok(())
    }
}

/// Position lifecycle states. Later states are not modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    Uninitialized,
    /// Entry order created in the order manager
    EntriesPlaced,
}

impl PositionStatus {
    pub fn can_transition_to(&self, next: PositionStatus) -> bool {
        match self {
            Self::Uninitialized => true,
            Self::EntriesPlaced => next == Self::EntriesPlaced,
        }
    }
}

impl std::fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "UNINITIALIZED"),
            Self::EntriesPlaced => write!(f, "ENTRIES_PLACED"),
        }
    }
}

/// Persisted position lifecycle record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedPosition {
    #[serde(default)]
    pub id: RecordId,
    pub original_position: PositionSpec,
    pub created_timestamp: DateTime<Utc>,
    pub updated_timestamp: DateTime<Utc>,
    pub status: PositionStatus,
    pub closed: bool,
    /// Managed order ids
    pub entry_orders: Vec<RecordId>,
    pub target_orders: Vec<RecordId>,
    pub stoploss_orders: Vec<RecordId>,
}

impl ManagedPosition {
    #[must_use]
    pub fn new(spec: PositionSpec, now: DateTime<Utc>) -> Self {
        Self {
            id: RecordId::default(),
            original_position: spec,
            created_timestamp: now,
            updated_timestamp: now,
            status: PositionStatus::Uninitialized,
            closed: false,
            entry_orders: Vec::new(),
            target_orders: Vec::new(),
            stoploss_orders: Vec::new(),
        }
    }
}

impl Validate for ManagedPosition {
    fn validate(&self) -> Result<(), ValidationError> {
        self.original_position.validate()?;
        if self.status == PositionStatus::EntriesPlaced && self.entry_orders.is_empty() {
            return Err(ValidationError::new(
                "status ENTRIES_PLACED requires entryOrders",
            ));
        }
        Ok(())
    }
}

/// Partial update to a `ManagedPosition`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionPatch {
    pub status: Option<PositionStatus>,
    pub closed: Option<bool>,
    pub entry_orders: Option<Vec<RecordId>>,
}

impl PositionPatch {
    /// Entry orders were handed to the order manager.
    pub fn entries_placed(entry_orders: Vec<RecordId>) -> Self {
        Self {
            status: Some(PositionStatus::EntriesPlaced),
            entry_orders: Some(entry_orders),
            ..Default::default()
        }
    }
}

impl Record for ManagedPosition {
    const COLLECTION: &'static str = "managedPositions";
    type Status = PositionStatus;
    type Patch = PositionPatch;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn assign_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn status(&self) -> PositionStatus {
        self.status
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn apply(&mut self, patch: PositionPatch) -> Result<(), ValidationError> {
        if self.closed {
            return Err(ValidationError::new(format!(
                "position {} is closed and cannot be modified",
                self.id
            )));
        }

        if let Some(next) = patch.status {
            if !self.status.can_transition_to(next) {
                return Err(ValidationError::new(format!(
                    "invalid transition for position {}: {} -> {}",
                    self.id, self.status, next
                )));
            }
            if next == PositionStatus::EntriesPlaced
                && self.status != PositionStatus::EntriesPlaced
                && patch.entry_orders.as_ref().map_or(true, |o| o.is_empty())
            {
                return Err(ValidationError::new(format!(
                    "position {} cannot enter {} without entryOrders",
                    self.id, next
                )));
            }
        }

        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(closed) = patch.closed {
            self.closed = closed;
        }
        if let Some(entry_orders) = patch.entry_orders {
            self.entry_orders = entry_orders;
        }
        self.updated_timestamp = Utc::now();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn spec() -> PositionSpec {
        PositionSpec {
            exchange: "coinbasepro".to_string(),
            pair: "BTC/USD".to_string(),
            direction: Direction::Long,
            leverage: dec!(1),
            entries: vec![Target {
                amount: dec!(15),
                target: dec!(137.0),
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
            rationale: "breakout retest".to_string(),
        }
    }

    #[test]
    fn test_position_spec_validation() {
        assert!(spec().validate().is_ok());

        let mut no_targets = spec();
        no_targets.targets.clear();
        assert!(no_targets.validate().is_ok());

        let mut no_entries = spec();
        no_entries.entries.clear();
        assert!(no_entries.validate().is_err());

        let mut bad_stop = spec();
        bad_stop.stoploss = dec!(0);
        assert!(bad_stop.validate().is_err());

        let mut empty_rationale = spec();
        empty_rationale.rationale = String::new();
        assert!(empty_rationale.validate().is_err());
    }

    #[test]
    fn test_target_portions_must_sum_to_one() {
        let mut short = spec();
        short.targets[1].amount = dec!(0.4);
        let err = short.validate().unwrap_err();
        assert!(err.to_string().contains("sum to 1"));

        let mut thirds = spec();
        thirds.targets = vec![
            Target { amount: dec!(0.333333), target: dec!(150) },
            Target { amount: dec!(0.333333), target: dec!(160) },
            Target { amount: dec!(0.333334), target: dec!(170) },
        ];
        assert!(thirds.validate().is_ok());

        let mut oversized = spec();
        oversized.targets = vec![
            Target { amount: dec!(1.5), target: dec!(150) },
            Target { amount: dec!(-0.5), target: dec!(160) },
        ];
        assert!(oversized.validate().is_err());
    }

    #[test]
    fn test_entries_placed_requires_orders() {
        let mut position = ManagedPosition::new(spec(), Utc::now());
        position.assign_id(RecordId::new("p1"));

        let bare = PositionPatch {
            status: Some(PositionStatus::EntriesPlaced),
            ..Default::default()
        };
        assert!(position.apply(bare).is_err());
        assert!(position
            .apply(PositionPatch::entries_placed(Vec::new()))
            .is_err());

        position
            .apply(PositionPatch::entries_placed(vec![RecordId::new("o1")]))
            .unwrap();
        assert_eq!(position.status, PositionStatus::EntriesPlaced);
        assert_eq!(position.entry_orders, vec![RecordId::new("o1")]);
        assert!(position.validate().is_ok());

        let back = PositionPatch {
            status: Some(PositionStatus::Uninitialized),
            ..Default::default()
        };
        assert!(position.apply(back).is_err());
    }

    #[test]
    fn test_closed_position_is_terminal() {
        let mut position = ManagedPosition::new(spec(), Utc::now());
        position
            .apply(PositionPatch {
                closed: Some(true),
                ..Default::default()
            })
            .unwrap();
        assert!(position
            .apply(PositionPatch::entries_placed(vec![RecordId::new("o1")]))
            .is_err());
    }

    #[test]
    fn test_serialized_shape() {
        let mut position = ManagedPosition::new(spec(), Utc::now());
        position.assign_id(RecordId::new("p1"));
        let json = serde_json::to_value(&position).unwrap();
        assert_eq!(json["id"], "p1");
        assert_eq!(json["status"], "UNINITIALIZED");
        assert_eq!(json["originalPosition"]["entries"][0]["amount"], 15.0);
        assert_eq!(json["originalPosition"]["entries"][0]["target"], 137.0);
        assert!(json["entryOrders"].as_array().unwrap().is_empty());
        assert!(json["stoplossOrders"].is_array());
    }
}
