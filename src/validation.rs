//! Record validation.
//!
//! Every record type implements [`Validate`]; the store runs it on each insert
//! and on the result of each update, so invalid data is rejected before it is
//! persisted.

use rust_decimal::Decimal;
use thiserror::Error;

/// A record failed validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Trait for checking a value against its schema.
pub trait Validate {
    /// Returns Ok(()) if valid, the first violated rule otherwise.
    fn validate(&self) -> Result<(), ValidationError>;
}

impl<T: Validate> Validate for [T] {
    fn validate(&self) -> Result<(), ValidationError> {
        for item in self {
            item.validate()?;
        }
        Ok(())
    }
}

pub(crate) fn positive(field: &str, value: Decimal) -> Result<(), ValidationError> {
    if value > Decimal::ZERO {
        Ok(())
    } else {
        Err(ValidationError(format!(
            "{} must be positive, got {}",
            field, value
        )))
    }
}

pub(crate) fn non_negative(field: &str, value: Decimal) -> Result<(), ValidationError> {
    if value >= Decimal::ZERO {
        Ok(())
    } else {
        Err(ValidationError(format!(
            "{} must not be negative, got {}",
            field, value
        )))
    }
}

pub(crate) fn non_empty(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError(format!("{} is required", field)))
    } else {
        Ok(())
    }
}

/// Exchange names are configuration keys and must be plain alphanumerics.
pub(crate) fn exchange_name(value: &str) -> Result<(), ValidationError> {
    non_empty("exchange", value)?;
    if value.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(())
    } else {
        Err(ValidationError(format!(
            "exchange must be alphanumeric, got '{}'",
            value
        )))
    }
}
