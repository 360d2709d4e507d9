//! Cache configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Default entry limit for memoized functions
pub const DEFAULT_MAX_SIZE: usize = 100;

/// Configuration for a FIFO, TTL-bounded cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries; the oldest insertion is evicted beyond it
    pub max_size: usize,

    /// Time-to-live for entries (None = entries never go stale)
    #[serde(with = "crate::utils::serde::option_duration_millis")]
    pub ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_size: DEFAULT_MAX_SIZE, ttl: None }
    }
}

impl CacheConfig {
    /// Create a new configuration builder
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Quick preset bounded only by entry count
    pub fn bounded(max_size: usize) -> Self {
        Self { max_size, ttl: None }
    }

    /// Quick preset with both a TTL and an entry limit
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    ///
    /// use walletscope_resilience::cache::CacheConfig;
    ///
    /// let config = CacheConfig::ttl_bounded(Duration::from_secs(60), 500);
    /// assert_eq!(config.max_size, 500);
    /// ```
    pub fn ttl_bounded(ttl: Duration, max_size: usize) -> Self {
        Self { max_size, ttl: Some(ttl) }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_size == 0 {
            return Err(ConfigError::invalid("max_size must be greater than 0"));
        }
        if self.ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Err(ConfigError::invalid("ttl must be greater than 0 when set"));
        }
        Ok(())
    }
}

/// Builder for [`CacheConfig`]
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    #[must_use]
    pub fn max_size(mut self, size: usize) -> Self {
        self.config.max_size = size;
        self
    }

    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.config.ttl = Some(ttl);
        self
    }

    pub fn build(self) -> ConfigResult<CacheConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
