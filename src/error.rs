//! Error types for the synchronous manager operations.
//!
//! Only create/open/get calls surface errors to callers. Reconciliation
//! failures are recorded on the record or logged, never returned.

use thiserror::Error;

use crate::exchange::ExchangeError;
use crate::store::StoreError;
use crate::validation::ValidationError;

/// Errors returned by `OrderManager` / `PositionManager` public operations.
#[derive(Error, Debug)]
pub enum ManagerError {
    /// Spec failed schema validation; nothing was created
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Referenced exchange is not configured; nothing was created
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Store could not serve the request
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl ManagerError {
    pub fn unsupported_exchange(exchange: &str) -> Self {
        Self::Configuration(format!(
            "exchange '{}' is not configured",
            exchange
        ))
    }
}

impl From<StoreError> for ManagerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Validation(v) => Self::Validation(v),
            other => Self::Store(other),
        }
    }
}

/// Why a record could not be reconciled this tick. Logged, never propagated.
#[derive(Error, Debug)]
pub(crate) enum ReconciliationError {
    #[error("exchange '{0}' is not configured")]
    UnknownExchange(String),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Manager(#[from] ManagerError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_validation_maps_to_validation() {
        let err: ManagerError = StoreError::Validation(ValidationError::new("bad")).into();
        assert!(matches!(err, ManagerError::Validation(_)));

        let err: ManagerError = StoreError::Unavailable("down".to_string()).into();
        assert!(matches!(err, ManagerError::Store(_)));
    }

    #[test]
    fn test_unsupported_exchange_message() {
        let err = ManagerError::unsupported_exchange("binance");
        assert_eq!(
            err.to_string(),
            "Configuration error: exchange 'binance' is not configured"
        );
    }
}
