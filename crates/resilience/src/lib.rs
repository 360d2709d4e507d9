//! Resilience primitives for WalletScope's upstream calls.
//!
//! Chain indexers, price feeds and RPC endpoints fail, stall and rate-limit.
//! This crate wraps any "deferred computation that eventually yields a value
//! or an error" with the usual defences:
//!
//! - [`resilience`]: safe execution, timeouts, retry with backoff, circuit
//!   breaker, condition polling
//! - [`queue`]: bounded-concurrency task queue
//! - [`cache`]: FIFO TTL cache and memoization
//! - [`rate`]: debounce and throttle
//! - [`config`]: one document configuring every primitive
//!
//! # Safety and Quality
//!
//! No unsafe code. Failures are always values: every primitive reports
//! through [`ResilienceError`] (or the operation's own error for retry), and
//! configuration mistakes through [`ConfigError`].
//!
//! # Features
//!
//! - `test-utils`: the [`testing`] module for downstream test suites

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod cache;
pub mod config;
pub mod error;
pub mod queue;
pub mod rate;
pub mod resilience;
pub mod time;
pub mod utils;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(any(feature = "test-utils", test))]
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
pub use cache::{memoize, memoize_async, CacheConfig, CacheStats, MemoizeOptions, TtlCache};
pub use config::ToolkitConfig;
pub use error::{ConfigError, ConfigResult, ResilienceError, ResilienceResult};
pub use queue::{ConcurrencyQueue, QueueConfig, TaskHandle};
pub use rate::{Debounce, Throttle};
pub use resilience::{
    poll, retry, retry_with_policy, safe_run, safe_run_sync, with_deadline, with_timeout,
    CircuitBreaker, CircuitBreakerConfig, CircuitState, Jitter, PollConfig, Poller, RetryConfig,
    RetryExecutor, RetryPolicy, TimeoutConfig,
};
pub use time::{Clock, MockClock, SystemClock};
pub use utils::serde::duration_millis;
