//! Seed file bridging the CLI to the manager create operations.
//!
//! ```json
//! {
//!   "orders": [ { "exchange": "paper", "pair": "BTC/USD", "direction": "long",
//!                 "leverage": 1, "price": 137.0, "amount": 15, "type": "limit" } ],
//!   "positions": [],
//!   "users": [ { "username": "user1", "email": "test@email.com", "passwordHash": "..." } ]
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::orders::OrderSpec;
use crate::positions::PositionSpec;
use crate::users::UserDetails;

/// Errors that can occur when loading a seed file.
#[derive(Debug, Error)]
pub enum SeedError {
    #[error("Cannot read seed file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid seed JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Specs submitted once on startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub users: Vec<UserDetails>,
    #[serde(default)]
    pub orders: Vec<OrderSpec>,
    #[serde(default)]
    pub positions: Vec<PositionSpec>,
}

impl SeedFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SeedError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| SeedError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, SeedError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.orders.is_empty() && self.positions.is_empty()
    }
}
