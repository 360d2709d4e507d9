//! Memoization cache
//!
//! [`TtlCache`] is a thread-safe store with an entry limit and optional
//! time-to-live. Eviction is FIFO: once the limit is exceeded the entry that
//! was inserted first goes, however often it has been read since.
//!
//! [`memoize`] and [`memoize_async`] wrap functions with a [`TtlCache`]
//! keyed by their (serialized) arguments.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use walletscope_resilience::cache::{CacheConfig, TtlCache};
//!
//! let config = CacheConfig::builder()
//!     .max_size(1_000)
//!     .ttl(Duration::from_secs(300))
//!     .build()
//!     .unwrap();
//! let balances: TtlCache<String, u128> = TtlCache::new(config).unwrap();
//!
//! balances.insert("0xabc".to_string(), 42);
//! assert_eq!(balances.get(&"0xabc".to_string()), Some(42));
//! ```

pub mod config;
mod core;
pub mod memoize;
pub mod stats;

pub use self::config::{CacheConfig, CacheConfigBuilder, DEFAULT_MAX_SIZE};
pub use self::core::TtlCache;
pub use self::memoize::{
    memoize, memoize_async, memoize_async_with_clock, memoize_with_clock, AsyncMemoized, KeyFn,
    MemoizeOptions, Memoized,
};
pub use self::stats::CacheStats;
