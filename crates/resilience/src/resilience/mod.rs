//! Resilience patterns for wrapping unreliable async operations
//!
//! This module provides generic, composable wrappers:
//! - **Safe execution**: settle an operation into an `(error, value)` pair
//! - **Timeout**: race an operation against a timer
//! - **Retry**: exponential backoff with jitter and pluggable policies
//! - **Circuit Breaker**: stop calling a dependency that keeps failing
//! - **Polling**: re-invoke until a condition over the result holds
//!
//! Every wrapper takes the operation as a closure producing a future, so
//! they nest freely:
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use walletscope_resilience::resilience::{retry, with_timeout, CircuitBreaker, RetryConfig};
//!
//! # async fn fetch_balance() -> Result<u64, std::io::Error> { Ok(0) }
//! # async fn example() {
//! let breaker = CircuitBreaker::default();
//! let balance = retry(RetryConfig::default(), || {
//!     let breaker = breaker.clone();
//!     async move {
//!         with_timeout(
//!             async move { breaker.execute(fetch_balance).await },
//!             Duration::from_secs(5),
//!             "balance lookup timed out",
//!         )
//!         .await
//!         .map_err(|error| error.flatten())
//!     }
//! })
//! .await;
//! # let _ = balance;
//! # }
//! ```

pub mod circuit_breaker;
pub mod poll;
pub mod retry;
pub mod safe;
pub mod timeout;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerBuilderWithClock, CircuitBreakerConfig,
    CircuitBreakerConfigBuilder, CircuitBreakerMetrics, CircuitState, TrialPolicy,
};
pub use poll::{poll, NoopPollObserver, PollConfig, PollObserver, Poller};
pub use retry::policies::{AlwaysRetry, NeverRetry, PredicateRetry};
pub use retry::{
    retry, retry_with_policy, Jitter, NoopObserver, RetryConfig, RetryConfigBuilder,
    RetryDecision, RetryExecutor, RetryObserver, RetryOutcome, RetryPolicy,
};
pub use safe::{safe_run, safe_run_sync, settled_into_result, Settled};
pub use timeout::{with_deadline, with_timeout, TimeoutConfig, DEFAULT_TIMEOUT_MESSAGE};
