//! Condition polling
//!
//! [`Poller`] invokes an operation at a fixed interval until a predicate over
//! its result holds, or until `max_attempts` invocations have been made.
//! There is no sleep after the final attempt.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::{ConfigError, ConfigResult, ResilienceError, ResilienceResult};

/// Polling cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Fixed delay between attempts
    #[serde(with = "crate::utils::serde::duration_millis")]
    pub interval: Duration,
    /// Invocations allowed before giving up
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self { interval: Duration::from_secs(1), max_attempts: 10 }
    }
}

impl PollConfig {
    /// Create a validated configuration
    pub fn new(interval: Duration, max_attempts: u32) -> ConfigResult<Self> {
        let config = Self { interval, max_attempts };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("max_attempts must be at least 1"));
        }
        Ok(())
    }
}

/// Receives every polled result
///
/// Implemented for any `Fn(u32, &T)`.
pub trait PollObserver<T> {
    /// Attempt `attempt` (1-based) produced `result`
    fn on_poll(&self, attempt: u32, result: &T);
}

impl<T, F> PollObserver<T> for F
where
    F: Fn(u32, &T),
{
    fn on_poll(&self, attempt: u32, result: &T) {
        self(attempt, result);
    }
}

/// Observer that ignores every result
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPollObserver;

impl<T> PollObserver<T> for NoopPollObserver {
    fn on_poll(&self, _attempt: u32, _result: &T) {}
}

/// Polls an operation until a condition holds
#[derive(Debug, Clone)]
pub struct Poller<O = NoopPollObserver> {
    config: PollConfig,
    observer: O,
}

impl Poller {
    /// Create a poller without an observer
    pub const fn new(config: PollConfig) -> Self {
        Self { config, observer: NoopPollObserver }
    }
}

impl<O> Poller<O> {
    /// Attach an observer that sees every polled result
    pub fn on_poll<O2>(self, observer: O2) -> Poller<O2> {
        Poller { config: self.config, observer }
    }

    /// Poll `operation` until `condition` accepts its result
    ///
    /// An `Err` from the operation ends polling immediately and is returned
    /// as [`ResilienceError::OperationFailed`]. Exhausting the attempts
    /// yields [`ResilienceError::PollExceeded`].
    #[instrument(skip_all, fields(max_attempts = self.config.max_attempts))]
    pub async fn poll<F, Fut, T, E, P>(
        &self,
        mut operation: F,
        condition: P,
    ) -> ResilienceResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&T) -> bool,
        O: PollObserver<T>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let result = operation()
                .await
                .map_err(|source| ResilienceError::OperationFailed { source })?;

            self.observer.on_poll(attempt, &result);

            if condition(&result) {
                debug!("Polling condition met on attempt {}", attempt);
                return Ok(result);
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.config.interval).await;
            }
        }

        warn!("Polling condition not met after {} attempts", max_attempts);
        Err(ResilienceError::PollExceeded { attempts: max_attempts })
    }
}

/// Poll `operation` under `config` until `condition` holds
pub async fn poll<F, Fut, T, E, P>(
    config: PollConfig,
    operation: F,
    condition: P,
) -> ResilienceResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&T) -> bool,
    E: std::error::Error + Send + Sync + 'static,
{
    Poller::new(config).poll(operation, condition).await
}
