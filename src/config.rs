//! Application configuration.
//!
//! Loaded from a JSON file; every field except `exchanges` has a default.
//! `ORDERKEEPER_STORE_DIR` (also read from `.env`) overrides `storeDir`.
//!
//! ```json
//! {
//!   "exchanges": { "paper": { "kind": "paper" } },
//!   "orderPollIntervalSecs": 10,
//!   "positionPollIntervalSecs": 10,
//!   "exchangeCallTimeoutSecs": 15,
//!   "storeDir": "data"
//! }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::exchange::ExchangeConfig;
use crate::orders::OrderManagerConfig;
use crate::validation;

/// Environment variable overriding `storeDir`
pub const STORE_DIR_ENV: &str = "ORDERKEEPER_STORE_DIR";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Exchange name -> connection settings
    pub exchanges: HashMap<String, ExchangeConfig>,
    #[serde(default = "default_poll_interval_secs")]
    pub order_poll_interval_secs: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub position_poll_interval_secs: u64,
    #[serde(default = "default_call_timeout_secs")]
    pub exchange_call_timeout_secs: u64,
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_call_timeout_secs() -> u64 {
    15
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("data")
}

impl AppConfig {
    /// Read, apply environment overrides and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_json(&raw)?;
        if let Ok(dir) = std::env::var(STORE_DIR_ENV) {
            config.store_dir = PathBuf::from(dir);
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse without validating.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.exchanges.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one exchange must be configured".to_string(),
            ));
        }
        for name in self.exchanges.keys() {
            validation::exchange_name(name).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        if self.order_poll_interval_secs == 0 || self.position_poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "poll intervals must be greater than zero".to_string(),
            ));
        }
        if self.exchange_call_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "exchangeCallTimeoutSecs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn order_manager_config(&self) -> OrderManagerConfig {
        OrderManagerConfig {
            poll_interval: Duration::from_secs(self.order_poll_interval_secs),
            call_timeout: Duration::from_secs(self.exchange_call_timeout_secs),
        }
    }

    pub fn position_poll_interval(&self) -> Duration {
        Duration::from_secs(self.position_poll_interval_secs)
    }
}
