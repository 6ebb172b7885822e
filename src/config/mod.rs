//! # Auto-Assign Configuration
//!
//! Engine settings grouped by component. Every field has a documented default
//! so an empty file (or no file at all) yields a working configuration.
//!
//! ## Sources
//!
//! Values are layered in this order, later sources winning:
//!
//! 1. Built-in defaults (`#[serde(default)]` on every section)
//! 2. A TOML file, plus an optional `<stem>.<environment>.toml` next to it
//! 3. `AUTOASSIGN__SECTION__KEY` environment variables
//!
//! The merged result is validated before it is handed out; out-of-range values
//! are rejected instead of being clamped.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use autoassign_core::config::AutoAssignConfig;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AutoAssignConfig::load(Some(Path::new("config/autoassign.toml")))?;
//! let interval = config.lifecycle.sweep_interval();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::constants::{builder, query, scoring};
use crate::orchestration::{FairnessConfig, RegenerationPolicy};
use crate::resilience::BackoffConfig;
use crate::scoring::{ScoringParams, ScoringWeights};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoAssignConfig {
    pub builder: BuilderSettings,
    pub scoring: ScoringParams,
    pub lifecycle: LifecycleSettings,
    pub regeneration: RegenerationSettings,
    pub retry: BackoffConfig,
    pub publisher: PublisherSettings,
    pub query: QuerySettings,
    pub velocity: VelocitySettings,
    pub database: DatabaseSettings,
}

/// Defaults applied to enqueue requests that omit a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderSettings {
    pub limit: u32,
    pub max_limit: u32,
    pub expires_in_minutes: u32,
    pub weights: ScoringWeights,
    pub fairness: FairnessConfig,
}

impl Default for BuilderSettings {
    fn default() -> Self {
        Self {
            limit: builder::DEFAULT_QUEUE_LIMIT,
            max_limit: builder::MAX_QUEUE_LIMIT,
            expires_in_minutes: builder::DEFAULT_EXPIRES_IN_MINUTES,
            weights: ScoringWeights::default(),
            fairness: FairnessConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleSettings {
    pub sweep_interval_ms: u64,
    pub sweep_batch_size: usize,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 15_000,
            sweep_batch_size: 500,
        }
    }
}

impl LifecycleSettings {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegenerationSettings {
    pub policy: RegenerationPolicy,
    pub provider_timeout_ms: u64,
    pub store_timeout_ms: u64,
}

impl Default for RegenerationSettings {
    fn default() -> Self {
        Self {
            policy: RegenerationPolicy::default(),
            provider_timeout_ms: 5_000,
            store_timeout_ms: 2_000,
        }
    }
}

impl RegenerationSettings {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherSettings {
    /// Events buffered per subscriber before it is disconnected
    pub subscriber_buffer: usize,
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self {
            subscriber_buffer: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            default_page_size: query::DEFAULT_PAGE_SIZE,
            max_page_size: query::MAX_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VelocitySettings {
    pub lookback_days: u32,
    /// Below this many samples a metric is reported as insufficient
    pub min_samples: usize,
}

impl Default for VelocitySettings {
    fn default() -> Self {
        Self {
            lookback_days: 30,
            min_samples: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
        }
    }
}

impl AutoAssignConfig {
    /// Load defaults, an optional TOML file and `AUTOASSIGN__*` overrides.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        Ok(ConfigManager::load(path)?.config().clone())
    }

    /// Reject values outside their documented ranges.
    pub fn validate(&self) -> ConfigResult<()> {
        let b = &self.builder;
        if b.max_limit == 0 || b.max_limit > builder::MAX_QUEUE_LIMIT {
            return Err(ConfigurationError::invalid_value(
                "builder.max_limit",
                b.max_limit,
                format!("must be between 1 and {}", builder::MAX_QUEUE_LIMIT),
            ));
        }
        if b.limit == 0 || b.limit > b.max_limit {
            return Err(ConfigurationError::invalid_value(
                "builder.limit",
                b.limit,
                format!("must be between 1 and builder.max_limit ({})", b.max_limit),
            ));
        }
        if b.expires_in_minutes == 0 || b.expires_in_minutes > builder::MAX_EXPIRES_IN_MINUTES {
            return Err(ConfigurationError::invalid_value(
                "builder.expires_in_minutes",
                b.expires_in_minutes,
                format!("must be between 1 and {}", builder::MAX_EXPIRES_IN_MINUTES),
            ));
        }
        if let Err(e) = b.weights.validate() {
            return Err(ConfigurationError::invalid_value(
                "builder.weights",
                format!("{:?}", b.weights),
                e.to_string(),
            ));
        }
        if b.fairness.window_days == 0 {
            return Err(ConfigurationError::invalid_value(
                "builder.fairness.window_days",
                0,
                "must be greater than 0",
            ));
        }

        let s = &self.scoring;
        if s.recency_window_days == 0 {
            return Err(ConfigurationError::invalid_value(
                "scoring.recency_window_days",
                0,
                "must be greater than 0",
            ));
        }
        if !s.earnings_cap.is_finite() || s.earnings_cap <= 0.0 {
            return Err(ConfigurationError::invalid_value(
                "scoring.earnings_cap",
                s.earnings_cap,
                "must be a positive number",
            ));
        }
        if !(0.0..=scoring::MAX_SCORE).contains(&s.neutral_score) {
            return Err(ConfigurationError::invalid_value(
                "scoring.neutral_score",
                s.neutral_score,
                format!("must be between 0 and {}", scoring::MAX_SCORE),
            ));
        }

        if self.lifecycle.sweep_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "lifecycle.sweep_interval_ms",
                0,
                "must be greater than 0",
            ));
        }
        if self.lifecycle.sweep_batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "lifecycle.sweep_batch_size",
                0,
                "must be greater than 0",
            ));
        }

        if self.regeneration.provider_timeout_ms == 0 || self.regeneration.store_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "regeneration",
                format!(
                    "provider_timeout_ms={}, store_timeout_ms={}",
                    self.regeneration.provider_timeout_ms, self.regeneration.store_timeout_ms
                ),
                "timeouts must be greater than 0",
            ));
        }

        self.retry.validate()?;

        if self.publisher.subscriber_buffer == 0 {
            return Err(ConfigurationError::invalid_value(
                "publisher.subscriber_buffer",
                0,
                "must be greater than 0",
            ));
        }

        let q = &self.query;
        if q.max_page_size == 0 || q.max_page_size > query::MAX_PAGE_SIZE {
            return Err(ConfigurationError::invalid_value(
                "query.max_page_size",
                q.max_page_size,
                format!("must be between 1 and {}", query::MAX_PAGE_SIZE),
            ));
        }
        if q.default_page_size == 0 || q.default_page_size > q.max_page_size {
            return Err(ConfigurationError::invalid_value(
                "query.default_page_size",
                q.default_page_size,
                "must be between 1 and query.max_page_size",
            ));
        }

        if self.velocity.lookback_days == 0 || self.velocity.min_samples == 0 {
            return Err(ConfigurationError::invalid_value(
                "velocity",
                format!(
                    "lookback_days={}, min_samples={}",
                    self.velocity.lookback_days, self.velocity.min_samples
                ),
                "must both be greater than 0",
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigurationError::invalid_value(
                "database.max_connections",
                0,
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}
