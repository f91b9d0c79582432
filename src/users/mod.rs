//! User Management Module
//!
//! Account details kept next to orders and positions. Users are created and
//! read only; no loop touches them.

mod manager;
mod types;

pub use manager::UserManager;
pub use types::{UserDetails, UserPatch};
