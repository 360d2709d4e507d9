//! Retry with exponential backoff and jitter
//!
//! [`RetryExecutor`] re-invokes a failing operation up to `max_attempts`
//! times, strictly sequentially, sleeping between attempts. The delay before
//! retry `n` is `min(initial_delay * backoff_multiplier^(n-1), max_delay)`
//! with optional jitter. When the attempts run out the operation's last
//! error is returned unchanged, so callers see the real failure rather than
//! a retry wrapper.
//!
//! Whether a particular error is worth retrying is decided by a
//! [`RetryPolicy`]; progress between attempts is reported to a
//! [`RetryObserver`].

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::error::{ConfigError, ConfigResult};

//==============================================================================
// Policy, Observer and Jitter
//==============================================================================

/// Decides whether an error should be retried
pub trait RetryPolicy<E> {
    /// Inspect the error from attempt `attempt` (1-based)
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision;
}

/// Decision returned by a [`RetryPolicy`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the configured backoff delay
    Retry,
    /// Retry after a caller-chosen delay
    RetryAfter(Duration),
    /// Surface the error without further attempts
    Stop,
}

/// Notified before each retry sleep
///
/// Implemented for any `Fn(u32, &E)`, so a closure can be passed directly.
/// Observers are called synchronously and cannot influence the retry.
pub trait RetryObserver<E> {
    /// Attempt `attempt` (1-based) failed with `error` and will be retried
    fn on_retry(&self, attempt: u32, error: &E);
}

impl<E, F> RetryObserver<E> for F
where
    F: Fn(u32, &E),
{
    fn on_retry(&self, attempt: u32, error: &E) {
        self(attempt, error);
    }
}

/// Observer that ignores every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl<E> RetryObserver<E> for NoopObserver {
    fn on_retry(&self, _attempt: u32, _error: &E) {}
}

/// Randomization applied to the computed backoff delay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Jitter {
    /// Sleep exactly the computed delay
    None,
    /// Sleep uniformly in `[0, delay]`
    Full,
    /// Sleep uniformly in `[delay / 2, delay]`
    #[default]
    Equal,
}

impl Jitter {
    /// Apply this jitter to `delay`
    pub fn apply(self, delay: Duration) -> Duration {
        let factor = match self {
            Self::None => return delay,
            Self::Full => rand::thread_rng().gen_range(0.0..=1.0),
            Self::Equal => rand::thread_rng().gen_range(0.5..=1.0),
        };
        delay.mul_f64(factor)
    }
}

//==============================================================================
// Configuration
//==============================================================================

/// Retry behaviour for one call site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total invocations allowed, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    #[serde(with = "crate::utils::serde::duration_millis")]
    pub initial_delay: Duration,
    /// Growth factor applied per retry
    pub backoff_multiplier: f64,
    /// Upper bound for any single delay
    #[serde(with = "crate::utils::serde::duration_millis")]
    pub max_delay: Duration,
    /// Randomization applied to each delay
    pub jitter: Jitter,
    /// Overall time budget; once spent, the latest error is surfaced
    #[serde(with = "crate::utils::serde::option_duration_millis")]
    pub max_total_time: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            jitter: Jitter::Equal,
            max_total_time: None,
        }
    }
}

impl RetryConfig {
    /// Create a configuration builder
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Create a configuration builder (alias for `new()`)
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("max_attempts must be at least 1"));
        }

        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::invalid("backoff_multiplier must be a finite value >= 1.0"));
        }

        if self.max_delay < self.initial_delay {
            return Err(ConfigError::invalid("max_delay must be >= initial_delay"));
        }

        if self.max_total_time.is_some_and(|budget| budget.is_zero()) {
            return Err(ConfigError::invalid("max_total_time must be greater than 0"));
        }

        Ok(())
    }

    /// Backoff delay before retrying after attempt `attempt` (1-based),
    /// without jitter
    ///
    /// Total over unvalidated configs: a non-finite product yields
    /// `max_delay` and a negative one yields zero.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let scaled = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else if scaled <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(scaled)
        }
    }
}

/// Builder for [`RetryConfig`]
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    /// Start from the default configuration
    pub fn new() -> Self {
        Self { config: RetryConfig::default() }
    }

    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.config.initial_delay = delay;
        self
    }

    #[must_use]
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.config.backoff_multiplier = multiplier;
        self
    }

    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.max_delay = delay;
        self
    }

    /// Set initial delay, multiplier and cap in one call
    #[must_use]
    pub fn exponential_backoff(
        mut self,
        initial_delay: Duration,
        multiplier: f64,
        max_delay: Duration,
    ) -> Self {
        self.config.initial_delay = initial_delay;
        self.config.backoff_multiplier = multiplier;
        self.config.max_delay = max_delay;
        self
    }

    #[must_use]
    pub fn jitter(mut self, jitter: Jitter) -> Self {
        self.config.jitter = jitter;
        self
    }

    #[must_use]
    pub fn no_jitter(self) -> Self {
        self.jitter(Jitter::None)
    }

    #[must_use]
    pub fn max_total_time(mut self, budget: Duration) -> Self {
        self.config.max_total_time = Some(budget);
        self
    }

    pub fn build(self) -> ConfigResult<RetryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

//==============================================================================
// Executor
//==============================================================================

/// Result of a retried call together with attempt statistics
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    /// The final success value or the last error
    pub result: Result<T, E>,
    /// Invocations performed
    pub attempts: u32,
    /// Time spent sleeping between attempts
    pub total_delay: Duration,
    /// Whether the time budget cut the retries short
    pub budget_exhausted: bool,
}

impl<T, E> RetryOutcome<T, E> {
    /// Consume the outcome and return only the result
    pub fn into_result(self) -> Result<T, E> {
        self.result
    }
}

/// Runs operations under a [`RetryConfig`]
pub struct RetryExecutor<P = policies::AlwaysRetry, O = NoopObserver> {
    config: RetryConfig,
    policy: P,
    observer: O,
}

impl<P: fmt::Debug, O> fmt::Debug for RetryExecutor<P, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("config", &self.config)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RetryExecutor {
    /// Executor that retries every error
    pub fn new(config: RetryConfig) -> Self {
        Self { config, policy: policies::AlwaysRetry, observer: NoopObserver }
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl<P, O> RetryExecutor<P, O> {
    /// Replace the retry policy
    pub fn with_policy<P2>(self, policy: P2) -> RetryExecutor<P2, O> {
        RetryExecutor { config: self.config, policy, observer: self.observer }
    }

    /// Attach an observer notified before every retry sleep
    pub fn on_retry<O2>(self, observer: O2) -> RetryExecutor<P, O2> {
        RetryExecutor { config: self.config, policy: self.policy, observer }
    }

    /// The configuration in use
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute `operation`, returning its value or its last error
    #[instrument(skip(self, operation), fields(max_attempts = self.config.max_attempts))]
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        P: RetryPolicy<E>,
        O: RetryObserver<E>,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with_outcome(operation).await.into_result()
    }

    /// Execute `operation` and report attempt statistics alongside the result
    pub async fn execute_with_outcome<F, Fut, T, E>(&self, mut operation: F) -> RetryOutcome<T, E>
    where
        P: RetryPolicy<E>,
        O: RetryObserver<E>,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let started = Instant::now();
        let max_attempts = self.config.max_attempts.max(1);
        let mut total_delay = Duration::ZERO;
        let mut attempt = 1;

        loop {
            debug!("Executing operation (attempt {}/{})", attempt, max_attempts);

            let error = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("Operation succeeded after {} attempts", attempt);
                    }
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                        total_delay,
                        budget_exhausted: false,
                    };
                }
                Err(error) => error,
            };

            if attempt >= max_attempts {
                warn!("All {} retry attempts exhausted, last error: {}", attempt, error);
                return RetryOutcome {
                    result: Err(error),
                    attempts: attempt,
                    total_delay,
                    budget_exhausted: false,
                };
            }

            if let Some(budget) = self.config.max_total_time {
                if started.elapsed() >= budget {
                    warn!("Retry budget of {:?} spent after {} attempts", budget, attempt);
                    return RetryOutcome {
                        result: Err(error),
                        attempts: attempt,
                        total_delay,
                        budget_exhausted: true,
                    };
                }
            }

            let delay = match self.policy.should_retry(&error, attempt) {
                RetryDecision::Stop => {
                    debug!("Retry policy stopped after attempt {}: {}", attempt, error);
                    return RetryOutcome {
                        result: Err(error),
                        attempts: attempt,
                        total_delay,
                        budget_exhausted: false,
                    };
                }
                RetryDecision::Retry => {
                    self.config.jitter.apply(self.config.delay_for_attempt(attempt))
                }
                RetryDecision::RetryAfter(delay) => delay,
            };

            self.observer.on_retry(attempt, &error);
            warn!("Operation failed (attempt {}): {}; retrying after {:?}", attempt, error, delay);

            tokio::time::sleep(delay).await;
            total_delay += delay;
            attempt += 1;
        }
    }
}

/// Retry `operation` under `config`, retrying every error
pub async fn retry<F, Fut, T, E>(config: RetryConfig, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    RetryExecutor::new(config).execute(operation).await
}

/// Retry `operation` under `config`, consulting `policy` after each failure
pub async fn retry_with_policy<F, Fut, T, E, P>(
    config: RetryConfig,
    policy: P,
    operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: RetryPolicy<E>,
    E: fmt::Display,
{
    RetryExecutor::new(config).with_policy(policy).execute(operation).await
}

/// Ready-made retry policies
pub mod policies {
    use super::{RetryDecision, RetryPolicy};

    /// Retry every error
    #[derive(Debug, Clone, Copy, Default)]
    pub struct AlwaysRetry;

    impl<E> RetryPolicy<E> for AlwaysRetry {
        fn should_retry(&self, _error: &E, _attempt: u32) -> RetryDecision {
            RetryDecision::Retry
        }
    }

    /// Never retry
    #[derive(Debug, Clone, Copy, Default)]
    pub struct NeverRetry;

    impl<E> RetryPolicy<E> for NeverRetry {
        fn should_retry(&self, _error: &E, _attempt: u32) -> RetryDecision {
            RetryDecision::Stop
        }
    }

    /// Retry while a predicate over the error and attempt holds
    #[derive(Debug, Clone)]
    pub struct PredicateRetry<F> {
        predicate: F,
    }

    impl<F> PredicateRetry<F> {
        pub const fn new(predicate: F) -> Self {
            Self { predicate }
        }
    }

    impl<F, E> RetryPolicy<E> for PredicateRetry<F>
    where
        F: Fn(&E, u32) -> bool,
    {
        fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision {
            if (self.predicate)(error, attempt) {
                RetryDecision::Retry
            } else {
                RetryDecision::Stop
            }
        }
    }
}
