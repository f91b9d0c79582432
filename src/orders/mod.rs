//! Order Management Module
//!
//! Provides the managed-order lifecycle and its reconciliation loop.
//!
//! # Architecture
//!
//! - `OrderManager` - public create/list/get operations
//! - Reconciliation tick - single-flight placement and status refresh
//! - Core types - `OrderSpec`, `ManagedOrder`, `OrderStatus`, `OrderPatch`
//!
//! # Example
//!
//! ```ignore
//! use orderkeeper::orders::{OrderManager, OrderSpec};
//!
//! let manager = OrderManager::with_defaults(store, registry);
//! let id = manager.create_managed_order(spec).await?;
//!
//! // Placement happens on the next tick
//! manager.reconcile(&TickContext::detached()).await;
//! ```

mod manager;
mod reconciler;
mod types;

pub use manager::{OrderManager, OrderManagerConfig};
pub use reconciler::{OrderTickReport, PlacementOutcome};
pub use types::{ManagedOrder, OrderPatch, OrderSpec, OrderStatus};
