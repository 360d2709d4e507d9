//! Toolkit-wide configuration
//!
//! [`ToolkitConfig`] groups the per-primitive configs so an application can
//! keep them in one file. Every section is optional in the document and
//! falls back to the primitive's defaults.
//!
//! ## File formats
//! JSON and TOML, selected by file extension. Durations are integer
//! milliseconds:
//!
//! ```toml
//! [retry]
//! max_attempts = 5
//! initial_delay = 250
//!
//! [circuit_breaker]
//! failure_threshold = 3
//! cooldown = 30000
//!
//! [cache]
//! max_size = 500
//! ttl = 60000
//! ```
//!
//! ## Environment Variables
//! Applied on top of file values by [`ToolkitConfig::apply_env_overrides`]:
//! - `WALLETSCOPE_RETRY_MAX_ATTEMPTS`: retry attempts
//! - `WALLETSCOPE_RETRY_INITIAL_DELAY_MS`: first retry delay
//! - `WALLETSCOPE_BREAKER_FAILURE_THRESHOLD`: failures that open the circuit
//! - `WALLETSCOPE_BREAKER_COOLDOWN_MS`: breaker cooldown
//! - `WALLETSCOPE_TIMEOUT_MS`: default timeout
//! - `WALLETSCOPE_QUEUE_CONCURRENCY`: queue concurrency
//! - `WALLETSCOPE_CACHE_MAX_SIZE`: cache entry limit
//! - `WALLETSCOPE_CACHE_TTL_MS`: cache TTL (`0` disables expiry)
//! - `WALLETSCOPE_POLL_INTERVAL_MS`: polling interval
//! - `WALLETSCOPE_POLL_MAX_ATTEMPTS`: polling attempts

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::CacheConfig;
use crate::error::{ConfigError, ConfigResult};
use crate::queue::QueueConfig;
use crate::resilience::{CircuitBreakerConfig, PollConfig, RetryConfig, TimeoutConfig};

/// Configuration for every primitive in the toolkit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolkitConfig {
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub timeout: TimeoutConfig,
    pub queue: QueueConfig,
    pub cache: CacheConfig,
    pub poll: PollConfig,
}

impl ToolkitConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse { message: format!("Invalid TOML format: {e}") })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(contents: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(contents)
            .map_err(|e| ConfigError::Parse { message: format!("Invalid JSON format: {e}") })?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a `.toml` or `.json` file
    ///
    /// # Errors
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Parse`] for malformed or unsupported documents, and
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "Loading toolkit configuration from file");

        let contents = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        match extension {
            "toml" => Self::from_toml_str(&contents),
            "json" => Self::from_json_str(&contents),
            other => {
                Err(ConfigError::Parse { message: format!("Unsupported config format: {other}") })
            }
        }
    }

    /// Override values from `WALLETSCOPE_*` environment variables
    pub fn apply_env_overrides(&mut self) -> ConfigResult<()> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Override values using an arbitrary variable lookup
    ///
    /// Unset variables leave the current value untouched; unparsable ones
    /// are rejected.
    pub fn apply_overrides_from<L>(&mut self, lookup: L) -> ConfigResult<()>
    where
        L: Fn(&str) -> Option<String>,
    {
        let mut applied = 0usize;
        let mut read = |name: &'static str| {
            let value = lookup(name);
            if value.is_some() {
                applied += 1;
                tracing::debug!(variable = name, "Applying configuration override");
            }
            value
        };

        if let Some(v) = parse_var::<u32>(&mut read, "WALLETSCOPE_RETRY_MAX_ATTEMPTS")? {
            self.retry.max_attempts = v;
        }
        if let Some(v) = parse_var::<u64>(&mut read, "WALLETSCOPE_RETRY_INITIAL_DELAY_MS")? {
            self.retry.initial_delay = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<u32>(&mut read, "WALLETSCOPE_BREAKER_FAILURE_THRESHOLD")? {
            self.circuit_breaker.failure_threshold = v;
        }
        if let Some(v) = parse_var::<u64>(&mut read, "WALLETSCOPE_BREAKER_COOLDOWN_MS")? {
            self.circuit_breaker.cooldown = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<u64>(&mut read, "WALLETSCOPE_TIMEOUT_MS")? {
            self.timeout.timeout = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<usize>(&mut read, "WALLETSCOPE_QUEUE_CONCURRENCY")? {
            self.queue.concurrency = v;
        }
        if let Some(v) = parse_var::<usize>(&mut read, "WALLETSCOPE_CACHE_MAX_SIZE")? {
            self.cache.max_size = v;
        }
        if let Some(v) = parse_var::<u64>(&mut read, "WALLETSCOPE_CACHE_TTL_MS")? {
            self.cache.ttl = (v > 0).then(|| Duration::from_millis(v));
        }
        if let Some(v) = parse_var::<u64>(&mut read, "WALLETSCOPE_POLL_INTERVAL_MS")? {
            self.poll.interval = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<u32>(&mut read, "WALLETSCOPE_POLL_MAX_ATTEMPTS")? {
            self.poll.max_attempts = v;
        }

        if applied > 0 {
            tracing::info!(applied, "Configuration overrides applied");
        }
        Ok(())
    }

    /// Validate every section
    pub fn validate(&self) -> ConfigResult<()> {
        self.retry.validate().map_err(|e| section_error("retry", e))?;
        self.circuit_breaker.validate().map_err(|e| section_error("circuit_breaker", e))?;
        self.timeout.validate().map_err(|e| section_error("timeout", e))?;
        self.queue.validate().map_err(|e| section_error("queue", e))?;
        self.cache.validate().map_err(|e| section_error("cache", e))?;
        self.poll.validate().map_err(|e| section_error("poll", e))?;
        Ok(())
    }
}

fn parse_var<T>(
    read: &mut impl FnMut(&'static str) -> Option<String>,
    name: &'static str,
) -> ConfigResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    read(name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| ConfigError::invalid(format!("{name}: cannot parse {raw:?}: {e}")))
        })
        .transpose()
}

fn section_error(section: &str, error: ConfigError) -> ConfigError {
    match error {
        ConfigError::Invalid { message } => ConfigError::invalid(format!("[{section}] {message}")),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |name| vars.get(name).cloned()
    }

    /// Validates that an empty document yields defaults.
    ///
    /// Assertions:
    /// - Confirms both parsers return `ToolkitConfig::default()`.
    #[test]
    fn test_empty_documents_use_defaults() {
        assert_eq!(ToolkitConfig::from_toml_str("").expect("toml"), ToolkitConfig::default());
        assert_eq!(ToolkitConfig::from_json_str("{}").expect("json"), ToolkitConfig::default());
    }

    /// Validates partial TOML sections merge with defaults.
    ///
    /// Assertions:
    /// - Confirms set fields are read as milliseconds.
    /// - Confirms unset fields keep their defaults.
    #[test]
    fn test_partial_toml() {
        let config = ToolkitConfig::from_toml_str(
            r#"
            [retry]
            max_attempts = 5

            [cache]
            ttl = 1500
            "#,
        )
        .expect("valid toml");

        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_delay, Duration::from_secs(1));
        assert_eq!(config.cache.ttl, Some(Duration::from_millis(1500)));
        assert_eq!(config.cache.max_size, 100);
    }

    /// Validates malformed input is reported as a parse error.
    ///
    /// Assertions:
    /// - Ensures a wrong value type fails with `ConfigError::Parse`.
    #[test]
    fn test_parse_errors() {
        let result = ToolkitConfig::from_json_str(r#"{"queue": {"concurrency": "many"}}"#);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    /// Validates that parsed documents are range-checked before use.
    ///
    /// Assertions:
    /// - Ensures a negative backoff multiplier in TOML is `ConfigError::Invalid`.
    /// - Ensures a zero queue concurrency in JSON is `ConfigError::Invalid`.
    #[test]
    fn test_parsers_reject_out_of_range_values() {
        let toml = ToolkitConfig::from_toml_str(
            r#"
            [retry]
            max_attempts = 3
            backoff_multiplier = -2.0
            "#,
        );
        assert!(matches!(toml, Err(ConfigError::Invalid { .. })));

        let json = ToolkitConfig::from_json_str(r#"{"queue": {"concurrency": 0}}"#);
        assert!(matches!(json, Err(ConfigError::Invalid { .. })));
    }

    /// Validates overrides from a variable lookup.
    ///
    /// Assertions:
    /// - Confirms numeric overrides are applied.
    /// - Confirms a zero cache TTL disables expiry.
    #[test]
    fn test_apply_overrides() {
        let mut config = ToolkitConfig::default();
        config.cache.ttl = Some(Duration::from_secs(5));

        config
            .apply_overrides_from(lookup(&[
                ("WALLETSCOPE_RETRY_MAX_ATTEMPTS", "7"),
                ("WALLETSCOPE_BREAKER_COOLDOWN_MS", "2500"),
                ("WALLETSCOPE_QUEUE_CONCURRENCY", " 8 "),
                ("WALLETSCOPE_CACHE_TTL_MS", "0"),
            ]))
            .expect("valid overrides");

        assert_eq!(config.retry.max_attempts, 7);
        assert_eq!(config.circuit_breaker.cooldown, Duration::from_millis(2500));
        assert_eq!(config.queue.concurrency, 8);
        assert_eq!(config.cache.ttl, None);
    }

    /// Validates unparsable overrides are rejected.
    ///
    /// Assertions:
    /// - Ensures the error names the variable.
    #[test]
    fn test_invalid_override() {
        let mut config = ToolkitConfig::default();
        let err = config
            .apply_overrides_from(lookup(&[("WALLETSCOPE_POLL_MAX_ATTEMPTS", "lots")]))
            .expect_err("should fail");
        assert!(err.to_string().contains("WALLETSCOPE_POLL_MAX_ATTEMPTS"));
    }

    /// Validates section-level validation.
    ///
    /// Assertions:
    /// - Ensures the failing section is named in the message.
    #[test]
    fn test_validate_names_section() {
        let mut config = ToolkitConfig::default();
        config.queue.concurrency = 0;
        let err = config.validate().expect_err("invalid");
        assert!(err.to_string().contains("[queue]"));
    }
}
