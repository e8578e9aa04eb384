//! TOML application configuration.
//!
//! Every key is optional; a missing file section falls back to the defaults
//! (3 attempts, 1s backoff unit, 7-day window, 1-hour snapshot TTL).
//!
//! ```toml
//! [retry]
//! max_attempts = 3
//! base_delay_ms = 1000
//!
//! [aggregation]
//! window_days = 7
//! snapshot_ttl_secs = 3600
//!
//! [provider]
//! timeout_secs = 30
//!
//! [view]
//! color_metric = "pct_change"
//! size_metric = "amount_yi"
//! trailing_days = 7
//! color_scale = "RdYlGn_r"
//! ```

use crate::data::{AggregationConfig, EastMoneyConfig, RetryPolicy};
use crate::view::HeatmapQuery;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationSection {
    pub window_days: u32,
    pub snapshot_ttl_secs: u64,
}

impl Default for AggregationSection {
    fn default() -> Self {
        let agg = AggregationConfig::default();
        Self {
            window_days: agg.window_days,
            snapshot_ttl_secs: agg.snapshot_ttl.as_secs(),
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub retry: RetrySection,
    pub aggregation: AggregationSection,
    pub provider: EastMoneyConfig,
    pub view: HeatmapQuery,
}

impl AppConfig {
    /// Load from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        if self.aggregation.window_days == 0 {
            return Err(ConfigError::Invalid("aggregation.window_days must be at least 1".into()));
        }
        self.view
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("view: {e}")))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.base_delay_ms),
        )
    }

    pub fn aggregation_config(&self) -> AggregationConfig {
        AggregationConfig {
            window_days: self.aggregation.window_days,
            snapshot_ttl: Duration::from_secs(self.aggregation.snapshot_ttl_secs),
        }
    }
}
