//! Position Management Module
//!
//! A managed position realises its first entry as a managed order and then
//! waits in ENTRIES_PLACED. Target and stop-loss orders are not generated.

mod manager;
mod types;

pub use manager::{entry_order_spec, PositionManager, PositionTickReport};
pub use types::{ManagedPosition, PositionPatch, PositionSpec, PositionStatus, Target};
