//! Transport-agnostic facade over the order, position and user managers.
//!
//! A REST or RPC layer maps its routes onto these calls and serialises the
//! returned records (or the `ApiError`) as JSON.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ManagerError;
use crate::orders::{ManagedOrder, OrderManager, OrderSpec};
use crate::positions::{ManagedPosition, PositionManager, PositionSpec};
use crate::store::RecordId;
use crate::users::{UserDetails, UserManager};

/// Caller-visible error: `{"code": 400, "message": "id required"}`.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: u16,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            code: 400,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            code: 404,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: 500,
            message: message.into(),
        }
    }
}

impl From<ManagerError> for ApiError {
    fn from(e: ManagerError) -> Self {
        match e {
            ManagerError::Validation(v) => Self::bad_request(v.to_string()),
            ManagerError::Configuration(msg) => Self::bad_request(msg),
            ManagerError::Store(s) => Self::internal(s.to_string()),
        }
    }
}

fn require_id(id: &str) -> Result<RecordId, ApiError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(ApiError::bad_request("id required"));
    }
    Ok(RecordId::new(id))
}

/// Read/create operations exposed to callers. Never mutates existing records.
#[derive(Clone)]
pub struct Api {
    orders: Arc<OrderManager>,
    positions: Arc<PositionManager>,
    users: Arc<UserManager>,
}

impl Api {
    pub fn new(
        orders: Arc<OrderManager>,
        positions: Arc<PositionManager>,
        users: Arc<UserManager>,
    ) -> Self {
        Self {
            orders,
            positions,
            users,
        }
    }

    pub async fn create_managed_order(&self, spec: OrderSpec) -> Result<RecordId, ApiError> {
        Ok(self.orders.create_managed_order(spec).await?)
    }

    pub async fn list_open_managed_orders(&self) -> Result<Vec<ManagedOrder>, ApiError> {
        Ok(self.orders.list_open_managed_orders().await?)
    }

    pub async fn get_managed_order(&self, id: &str) -> Result<ManagedOrder, ApiError> {
        let id = require_id(id)?;
        self.orders
            .get_managed_order(&id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("No order found with id {}", id)))
    }

    pub async fn open_managed_position(&self, spec: PositionSpec) -> Result<RecordId, ApiError> {
        Ok(self.positions.open_managed_position(spec).await?)
    }

    pub async fn list_open_managed_positions(&self) -> Result<Vec<ManagedPosition>, ApiError> {
        Ok(self.positions.list_open_managed_positions().await?)
    }

    pub async fn get_managed_position(&self, id: &str) -> Result<ManagedPosition, ApiError> {
        let id = require_id(id)?;
        self.positions
            .get_managed_position(&id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("No position found with id {}", id)))
    }

    pub async fn create_user(&self, details: UserDetails) -> Result<RecordId, ApiError> {
        Ok(self.users.create_user(details).await?)
    }

    pub async fn list_user_details(&self) -> Result<Vec<UserDetails>, ApiError> {
        Ok(self.users.list_user_details().await?)
    }

    pub async fn get_user_details(&self, id: &str) -> Result<UserDetails, ApiError> {
        let id = require_id(id)?;
        self.users
            .get_user_details(&id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("No user details found with id {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{ExchangeRegistry, PaperExchange};
    use crate::store::{MemoryStore, StoreError};
    use crate::types::{Direction, OrderType};
    use crate::validation::ValidationError;
    use rust_decimal_macros::dec;

    fn api() -> Api {
        let registry =
            ExchangeRegistry::new().with_gateway("paper", Arc::new(PaperExchange::new("paper")));
        let orders = Arc::new(OrderManager::with_defaults(
            Arc::new(MemoryStore::<ManagedOrder>::new()),
            Arc::new(registry),
        ));
        let positions = Arc::new(PositionManager::new(
            Arc::new(MemoryStore::<ManagedPosition>::new()),
            orders.clone(),
        ));
        let users = Arc::new(UserManager::new(Arc::new(MemoryStore::<UserDetails>::new())));
        Api::new(orders, positions, users)
    }

    #[tokio::test]
    async fn test_missing_id_is_400() {
        let api = api();
        let err = api.get_managed_order("").await.unwrap_err();
        assert_eq!(err, ApiError::bad_request("id required"));

        let err = api.get_managed_position("  ").await.unwrap_err();
        assert_eq!(err.code, 400);
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            serde_json::json!({"code": 400, "message": "id required"})
        );
    }

    #[tokio::test]
    async fn test_unknown_id_is_404() {
        let api = api();
        let err = api.get_managed_order("abc").await.unwrap_err();
        assert_eq!(err, ApiError::not_found("No order found with id abc"));

        let err = api.get_managed_position("abc").await.unwrap_err();
        assert_eq!(err.message, "No position found with id abc");
    }

    #[tokio::test]
    async fn test_create_and_get_order() {
        let api = api();
        let spec = OrderSpec {
            exchange: "paper".to_string(),
            pair: "ETH/USD".to_string(),
            direction: Direction::Long,
            leverage: dec!(0),
            price: dec!(2000),
            amount: dec!(1),
            order_type: OrderType::Market,
        };
        let id = api.create_managed_order(spec.clone()).await.unwrap();
        let order = api.get_managed_order(id.as_str()).await.unwrap();
        assert_eq!(order.original_order, spec);
        assert_eq!(api.list_open_managed_orders().await.unwrap().len(), 1);

        let mut unknown = spec;
        unknown.exchange = "ftx".to_string();
        let err = api.create_managed_order(unknown).await.unwrap_err();
        assert_eq!(err.code, 400);
    }

    #[tokio::test]
    async fn test_user_routes() {
        let api = api();
        let id = api
            .create_user(UserDetails::new("user1", "test@email.com", "notreallyahash"))
            .await
            .unwrap();
        assert_eq!(api.get_user_details(id.as_str()).await.unwrap().username, "user1");
        assert_eq!(api.list_user_details().await.unwrap().len(), 1);

        let err = api.get_user_details("nobody").await.unwrap_err();
        assert_eq!(err, ApiError::not_found("No user details found with id nobody"));
        assert_eq!(api.get_user_details("").await.unwrap_err().code, 400);

        let err = api
            .create_user(UserDetails::new("user1", "other@email.com", "h"))
            .await
            .unwrap_err();
        assert_eq!(err.code, 400);
    }

    #[test]
    fn test_error_mapping() {
        let err: ApiError = ManagerError::Validation(ValidationError::new("amount must be positive")).into();
        assert_eq!(err.code, 400);

        let err: ApiError = ManagerError::Store(StoreError::Unavailable("disk".to_string())).into();
        assert_eq!(err.code, 500);
    }
}
