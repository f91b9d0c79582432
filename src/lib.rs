//! orderkeeper: keeps managed orders and positions in a local store in step
//! with an external trading venue.
//!
//! Two periodic loops drive the records forward: the order loop places
//! pending orders and refreshes fill state, the position loop turns newly
//! opened positions into entry orders.

pub mod api;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod exchange;
pub mod metrics;
pub mod observability;
pub mod orders;
pub mod positions;
pub mod scheduler;
pub mod store;
pub mod types;
pub mod users;
pub mod validation;
