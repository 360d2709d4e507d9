//! Memoizing wrappers over [`TtlCache`]
//!
//! [`memoize`] wraps a synchronous function, [`memoize_async`] wraps a
//! function returning a future of `Result`. Only successful results are
//! stored. Concurrent calls with the same key each invoke the function.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use super::config::{CacheConfig, DEFAULT_MAX_SIZE};
use super::core::TtlCache;
use super::stats::CacheStats;
use crate::error::ConfigResult;
use crate::time::{Clock, SystemClock};

/// Derives a cache key from call arguments; `None` bypasses the cache
pub type KeyFn<A> = Arc<dyn Fn(&A) -> Option<String> + Send + Sync>;

/// Options for [`memoize`] and [`memoize_async`]
pub struct MemoizeOptions<A> {
    /// Entry lifetime (None = entries never go stale)
    pub ttl: Option<Duration>,
    /// Maximum number of stored results
    pub max_size: usize,
    key_fn: KeyFn<A>,
}

impl<A> Clone for MemoizeOptions<A> {
    fn clone(&self) -> Self {
        Self { ttl: self.ttl, max_size: self.max_size, key_fn: Arc::clone(&self.key_fn) }
    }
}

impl<A> fmt::Debug for MemoizeOptions<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoizeOptions")
            .field("ttl", &self.ttl)
            .field("max_size", &self.max_size)
            .finish_non_exhaustive()
    }
}

impl<A: Serialize + 'static> Default for MemoizeOptions<A> {
    /// Keys are the JSON encoding of the arguments
    fn default() -> Self {
        Self::with_key_fn(|args: &A| match serde_json::to_string(args) {
            Ok(key) => Some(key),
            Err(error) => {
                debug!(%error, "Arguments not serializable, bypassing memo cache");
                None
            }
        })
    }
}

impl<A: Serialize + 'static> MemoizeOptions<A> {
    /// Default options (JSON-encoded argument keys, 100 entries, no TTL)
    pub fn new() -> Self {
        Self::default()
    }
}

impl<A: 'static> MemoizeOptions<A> {
    /// Options using a custom key function, for arguments that are not
    /// serializable or when only part of them identifies the result
    pub fn with_key<F>(key_fn: F) -> Self
    where
        F: Fn(&A) -> String + Send + Sync + 'static,
    {
        Self::with_key_fn(move |args: &A| Some(key_fn(args)))
    }

    /// Options using a key function that may decline to produce a key
    pub fn with_key_fn<F>(key_fn: F) -> Self
    where
        F: Fn(&A) -> Option<String> + Send + Sync + 'static,
    {
        Self { ttl: None, max_size: DEFAULT_MAX_SIZE, key_fn: Arc::new(key_fn) }
    }

    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    #[must_use]
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }
}

impl<A> MemoizeOptions<A> {
    fn cache_config(&self) -> CacheConfig {
        CacheConfig { max_size: self.max_size, ttl: self.ttl }
    }
}

/// A synchronous function with memoized results
pub struct Memoized<A, V, F, C = SystemClock> {
    func: F,
    cache: TtlCache<String, V, C>,
    key_fn: KeyFn<A>,
}

impl<A, V, F, C> fmt::Debug for Memoized<A, V, F, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoized").field("cache", &self.cache).finish_non_exhaustive()
    }
}

/// Memoize a synchronous function
///
/// # Example
/// ```
/// use walletscope_resilience::cache::{memoize, MemoizeOptions};
///
/// let square = memoize(|n: u64| n * n, MemoizeOptions::new().max_size(10)).unwrap();
/// assert_eq!(square.call(4), 16);
/// assert_eq!(square.stats().misses, 1);
/// assert_eq!(square.call(4), 16);
/// assert_eq!(square.stats().hits, 1);
/// ```
pub fn memoize<A, V, F>(func: F, options: MemoizeOptions<A>) -> ConfigResult<Memoized<A, V, F>>
where
    F: Fn(A) -> V,
    V: Clone,
{
    memoize_with_clock(func, options, SystemClock)
}

/// Memoize a synchronous function using a custom clock
pub fn memoize_with_clock<A, V, F, C>(
    func: F,
    options: MemoizeOptions<A>,
    clock: C,
) -> ConfigResult<Memoized<A, V, F, C>>
where
    F: Fn(A) -> V,
    V: Clone,
    C: Clock,
{
    let cache = TtlCache::with_clock(options.cache_config(), clock)?;
    Ok(Memoized { func, cache, key_fn: options.key_fn })
}

impl<A, V, F, C> Memoized<A, V, F, C>
where
    F: Fn(A) -> V,
    V: Clone,
    C: Clock,
{
    /// Return the stored result for `args`, computing it on a miss
    pub fn call(&self, args: A) -> V {
        let Some(key) = (self.key_fn)(&args) else {
            return (self.func)(args);
        };
        if let Some(value) = self.cache.get(&key) {
            return value;
        }
        let value = (self.func)(args);
        self.cache.insert(key, value.clone());
        value
    }

    /// Drop the stored result for `args`
    pub fn invalidate(&self, args: &A) -> bool {
        (self.key_fn)(args).is_some_and(|key| self.cache.remove(&key).is_some())
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// The underlying store
    pub const fn cache(&self) -> &TtlCache<String, V, C> {
        &self.cache
    }
}

/// An async, fallible function with memoized successes
pub struct AsyncMemoized<A, V, F, C = SystemClock> {
    func: F,
    cache: TtlCache<String, V, C>,
    key_fn: KeyFn<A>,
}

impl<A, V, F, C> fmt::Debug for AsyncMemoized<A, V, F, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncMemoized").field("cache", &self.cache).finish_non_exhaustive()
    }
}

/// Memoize an async function; errors are returned but never stored
pub fn memoize_async<A, V, E, F, Fut>(
    func: F,
    options: MemoizeOptions<A>,
) -> ConfigResult<AsyncMemoized<A, V, F>>
where
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<V, E>>,
    V: Clone,
{
    memoize_async_with_clock(func, options, SystemClock)
}

/// Memoize an async function using a custom clock
pub fn memoize_async_with_clock<A, V, E, F, Fut, C>(
    func: F,
    options: MemoizeOptions<A>,
    clock: C,
) -> ConfigResult<AsyncMemoized<A, V, F, C>>
where
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<V, E>>,
    V: Clone,
    C: Clock,
{
    let cache = TtlCache::with_clock(options.cache_config(), clock)?;
    Ok(AsyncMemoized { func, cache, key_fn: options.key_fn })
}

impl<A, V, F, C> AsyncMemoized<A, V, F, C>
where
    V: Clone,
    C: Clock,
{
    /// Return the stored result for `args`, awaiting the function on a miss
    pub async fn call<E, Fut>(&self, args: A) -> Result<V, E>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let Some(key) = (self.key_fn)(&args) else {
            return (self.func)(args).await;
        };
        if let Some(value) = self.cache.get(&key) {
            return Ok(value);
        }
        let value = (self.func)(args).await?;
        self.cache.insert(key, value.clone());
        Ok(value)
    }

    /// Drop the stored result for `args`
    pub fn invalidate(&self, args: &A) -> bool {
        (self.key_fn)(args).is_some_and(|key| self.cache.remove(&key).is_some())
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// The underlying store
    pub const fn cache(&self) -> &TtlCache<String, V, C> {
        &self.cache
    }
}
