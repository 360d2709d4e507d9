//! Circuit breaker for failing dependencies
//!
//! The breaker counts consecutive failures. Once `failure_threshold` is
//! reached it opens, and every call made within `cooldown` of the most recent
//! failure is rejected with [`ResilienceError::CircuitOpen`] without invoking
//! the operation. After the cooldown a trial call is let through:
//!
//! - With [`TrialPolicy::Optimistic`] (the default) any call after the
//!   cooldown goes through. A success closes the breaker and resets the
//!   counter; a failure bumps the counter and restarts the cooldown.
//! - With [`TrialPolicy::HalfOpen`] the breaker admits at most `max_probes`
//!   concurrent probes and closes after `success_threshold` successful ones;
//!   any probe failure reopens it. A probe that never settles, because its
//!   future was dropped or the operation panicked, reopens it as well.
//!
//! All counter updates happen under a single mutex so concurrent outcomes
//! cannot lose increments.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::{ConfigError, ConfigResult, ResilienceError, ResilienceResult};
use crate::time::{Clock, SystemClock};

//==============================================================================
// State and Configuration
//==============================================================================

/// Externally visible breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow through
    Closed,
    /// Calls are rejected until the cooldown elapses
    Open,
    /// Probing recovery with a bounded number of calls
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// How the breaker tests recovery once the cooldown has elapsed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TrialPolicy {
    /// Let calls through after the cooldown; the first success closes
    #[default]
    Optimistic,
    /// Admit a bounded number of probes and close after enough successes
    HalfOpen {
        /// Probes allowed in flight at once
        max_probes: u32,
        /// Successful probes required to close
        success_threshold: u32,
    },
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Time after the most recent failure during which calls are rejected
    #[serde(with = "crate::utils::serde::duration_millis")]
    pub cooldown: Duration,
    /// Recovery strategy after the cooldown
    pub trial: TrialPolicy,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
            trial: TrialPolicy::Optimistic,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration builder
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Create a configuration builder (alias for `new()`)
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::invalid("failure_threshold must be greater than 0"));
        }

        if let TrialPolicy::HalfOpen { max_probes, success_threshold } = self.trial {
            if max_probes == 0 {
                return Err(ConfigError::invalid("max_probes must be greater than 0"));
            }
            if success_threshold == 0 {
                return Err(ConfigError::invalid("success_threshold must be greater than 0"));
            }
        }

        Ok(())
    }
}

/// Builder for [`CircuitBreakerConfig`]
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    pub fn new() -> Self {
        Self { config: CircuitBreakerConfig::default() }
    }

    #[must_use]
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    #[must_use]
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.config.cooldown = cooldown;
        self
    }

    /// Use a bounded half-open phase instead of optimistic trials
    #[must_use]
    pub fn half_open(mut self, max_probes: u32, success_threshold: u32) -> Self {
        self.config.trial = TrialPolicy::HalfOpen { max_probes, success_threshold };
        self
    }

    /// Set a custom clock and build a breaker directly (useful for testing)
    pub fn clock<C: Clock>(self, clock: C) -> CircuitBreakerBuilderWithClock<C> {
        CircuitBreakerBuilderWithClock { config: self.config, clock }
    }

    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Builder carrying a custom clock that produces a [`CircuitBreaker`]
#[derive(Debug)]
pub struct CircuitBreakerBuilderWithClock<C: Clock> {
    config: CircuitBreakerConfig,
    clock: C,
}

impl<C: Clock> CircuitBreakerBuilderWithClock<C> {
    #[must_use]
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    #[must_use]
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.config.cooldown = cooldown;
        self
    }

    #[must_use]
    pub fn half_open(mut self, max_probes: u32, success_threshold: u32) -> Self {
        self.config.trial = TrialPolicy::HalfOpen { max_probes, success_threshold };
        self
    }

    pub fn build(self) -> ConfigResult<CircuitBreaker<C>> {
        CircuitBreaker::with_clock(self.config, self.clock)
    }
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    pub failure_count: u32,
    pub total_calls: u64,
    pub rejected_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub last_failure_time: Option<Instant>,
}

//==============================================================================
// Circuit Breaker
//==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Closed,
    Open,
    HalfOpen { in_flight: u32, successes: u32 },
}

#[derive(Debug)]
struct BreakerState {
    phase: Phase,
    failure_count: u32,
    last_failure: Option<Instant>,
}

impl BreakerState {
    const fn new() -> Self {
        Self { phase: Phase::Closed, failure_count: 0, last_failure: None }
    }
}

/// How a call was admitted, so its outcome can be recorded correctly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Probe,
}

#[derive(Debug, Default)]
struct CallCounters {
    total: AtomicU64,
    rejected: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

/// Circuit breaker guarding calls to one dependency
///
/// Clones share state, so one breaker can be handed to several tasks.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    config: CircuitBreakerConfig,
    state: Arc<Mutex<BreakerState>>,
    counters: Arc<CallCounters>,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("phase", &state.phase)
            .field("failure_count", &state.failure_count)
            .finish_non_exhaustive()
    }
}

impl<C: Clock> Clone for CircuitBreaker<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            counters: Arc::clone(&self.counters),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a breaker using the system clock
    pub fn new(config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }

    /// Create a breaker configuration builder
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }
}

impl Default for CircuitBreaker<SystemClock> {
    fn default() -> Self {
        Self {
            config: CircuitBreakerConfig::default(),
            state: Arc::new(Mutex::new(BreakerState::new())),
            counters: Arc::new(CallCounters::default()),
            clock: Arc::new(SystemClock),
        }
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a breaker with a custom clock (useful for testing)
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;

        Ok(Self {
            config,
            state: Arc::new(Mutex::new(BreakerState::new())),
            counters: Arc::new(CallCounters::default()),
            clock: Arc::new(clock),
        })
    }

    /// The configuration in use
    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Run an async operation under breaker protection
    ///
    /// Returns [`ResilienceError::CircuitOpen`] without invoking `operation`
    /// while the circuit is open and cooling down.
    #[instrument(skip(self, operation), fields(state = %self.state()))]
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let guard = AdmissionGuard::new(self, self.admit()?);

        match operation().await {
            Ok(value) => {
                guard.succeed();
                Ok(value)
            }
            Err(error) => {
                debug!(error = %error, "Circuit breaker: operation failed");
                guard.fail();
                Err(ResilienceError::OperationFailed { source: error })
            }
        }
    }

    /// Run a synchronous operation under breaker protection
    #[instrument(skip(self, operation), fields(state = %self.state()))]
    pub fn call<F, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let guard = AdmissionGuard::new(self, self.admit()?);

        match operation() {
            Ok(value) => {
                guard.succeed();
                Ok(value)
            }
            Err(error) => {
                debug!(error = %error, "Circuit breaker: operation failed");
                guard.fail();
                Err(ResilienceError::OperationFailed { source: error })
            }
        }
    }

    /// Record a success observed outside of `execute`/`call`
    pub fn record_success(&self) {
        self.on_success(Admission::Normal);
    }

    /// Record a failure observed outside of `execute`/`call`
    pub fn record_failure(&self) {
        self.on_failure(Admission::Normal);
    }

    /// Current state, accounting for an elapsed cooldown
    ///
    /// An open breaker whose cooldown has elapsed reports `HalfOpen`, since
    /// the next call will be let through as a trial.
    pub fn state(&self) -> CircuitState {
        let state = self.state.lock();
        match state.phase {
            Phase::Closed => CircuitState::Closed,
            Phase::HalfOpen { .. } => CircuitState::HalfOpen,
            Phase::Open if self.cooldown_elapsed(&state) => CircuitState::HalfOpen,
            Phase::Open => CircuitState::Open,
        }
    }

    /// Consecutive failures since the last success
    pub fn failure_count(&self) -> u32 {
        self.state.lock().failure_count
    }

    /// Whether a call made now would be admitted
    pub fn is_available(&self) -> bool {
        let state = self.state.lock();
        match state.phase {
            Phase::Closed => true,
            Phase::Open => self.cooldown_elapsed(&state),
            Phase::HalfOpen { in_flight, .. } => in_flight < self.max_probes(),
        }
    }

    /// Snapshot of the breaker's counters
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let (failure_count, last_failure_time) = {
            let state = self.state.lock();
            (state.failure_count, state.last_failure)
        };

        CircuitBreakerMetrics {
            state: self.state(),
            failure_count,
            total_calls: self.counters.total.load(Ordering::Acquire),
            rejected_calls: self.counters.rejected.load(Ordering::Acquire),
            successful_calls: self.counters.succeeded.load(Ordering::Acquire),
            failed_calls: self.counters.failed.load(Ordering::Acquire),
            last_failure_time,
        }
    }

    /// Force the breaker closed and clear its failure history
    pub fn reset(&self) {
        *self.state.lock() = BreakerState::new();
        info!("Circuit breaker manually reset to closed state");
    }

    fn admit<E>(&self) -> ResilienceResult<Admission, E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let mut state = self.state.lock();

        let admission = match (state.phase, self.config.trial) {
            (Phase::Closed, _) => Some(Admission::Normal),
            (Phase::Open, _) if !self.cooldown_elapsed(&state) => None,
            (Phase::Open, TrialPolicy::Optimistic) => Some(Admission::Normal),
            (Phase::Open, TrialPolicy::HalfOpen { .. }) => {
                info!("Circuit breaker cooldown elapsed, entering half-open state");
                state.phase = Phase::HalfOpen { in_flight: 1, successes: 0 };
                Some(Admission::Probe)
            }
            (Phase::HalfOpen { in_flight, successes }, _) => {
                if in_flight < self.max_probes() {
                    state.phase = Phase::HalfOpen { in_flight: in_flight + 1, successes };
                    Some(Admission::Probe)
                } else {
                    None
                }
            }
        };
        drop(state);

        if let Some(admission) = admission {
            self.counters.total.fetch_add(1, Ordering::Relaxed);
            Ok(admission)
        } else {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            debug!("Circuit breaker rejecting call");
            Err(ResilienceError::CircuitOpen)
        }
    }

    fn on_success(&self, admission: Admission) {
        self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock();
        state.failure_count = 0;

        match (state.phase, admission) {
            (Phase::HalfOpen { in_flight, successes }, Admission::Probe) => {
                let successes = successes + 1;
                if successes >= self.success_threshold() {
                    state.phase = Phase::Closed;
                    info!("Circuit breaker closed after {} successful probes", successes);
                } else {
                    state.phase =
                        Phase::HalfOpen { in_flight: in_flight.saturating_sub(1), successes };
                }
            }
            (Phase::Closed, _) => {}
            (previous, _) => {
                state.phase = Phase::Closed;
                info!("Circuit breaker closed after successful call (was {:?})", previous);
            }
        }
    }

    fn on_failure(&self, admission: Admission) {
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
        let now = self.clock.now();
        let mut state = self.state.lock();

        state.failure_count = state.failure_count.saturating_add(1);
        state.last_failure = Some(now);

        let probe_failed =
            admission == Admission::Probe && matches!(state.phase, Phase::HalfOpen { .. });

        if probe_failed {
            state.phase = Phase::Open;
            warn!("Circuit breaker reopened after failed probe");
        } else if state.failure_count >= self.config.failure_threshold {
            if state.phase != Phase::Open {
                warn!("Circuit breaker opened after {} failures", state.failure_count);
            }
            state.phase = Phase::Open;
        }
    }

    /// An admitted probe never settled: its future was dropped or the
    /// operation panicked. Reopen so the slot is released and a new cooldown
    /// governs the next probe.
    fn on_abandoned(&self, admission: Admission) {
        if admission != Admission::Probe {
            return;
        }

        let now = self.clock.now();
        let mut state = self.state.lock();
        if let Phase::HalfOpen { .. } = state.phase {
            state.phase = Phase::Open;
            state.last_failure = Some(now);
            warn!("Circuit breaker reopened after a probe was abandoned");
        }
    }

    fn cooldown_elapsed(&self, state: &BreakerState) -> bool {
        state.last_failure.map_or(true, |last| {
            self.clock.now().saturating_duration_since(last) >= self.config.cooldown
        })
    }

    const fn max_probes(&self) -> u32 {
        match self.config.trial {
            TrialPolicy::HalfOpen { max_probes, .. } => max_probes,
            TrialPolicy::Optimistic => u32::MAX,
        }
    }

    const fn success_threshold(&self) -> u32 {
        match self.config.trial {
            TrialPolicy::HalfOpen { success_threshold, .. } => success_threshold,
            TrialPolicy::Optimistic => 1,
        }
    }
}

/// Settles an admitted call exactly once
///
/// Dropping the guard without settling (cancelled future, panic) releases the
/// admission instead of leaking a half-open probe slot.
struct AdmissionGuard<'a, C: Clock> {
    breaker: &'a CircuitBreaker<C>,
    admission: Admission,
    settled: bool,
}

impl<'a, C: Clock> AdmissionGuard<'a, C> {
    const fn new(breaker: &'a CircuitBreaker<C>, admission: Admission) -> Self {
        Self { breaker, admission, settled: false }
    }

    fn succeed(mut self) {
        self.settled = true;
        self.breaker.on_success(self.admission);
    }

    fn fail(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.admission);
    }
}

impl<C: Clock> Drop for AdmissionGuard<'_, C> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_abandoned(self.admission);
        }
    }
}
