//! FIFO cache with TTL expiration
//!
//! Entries are evicted strictly in insertion order once the cache grows past
//! `max_size`, regardless of how recently they were read. Re-inserting an
//! existing key refreshes its timestamp and moves it to the back of the
//! queue.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::trace;

use super::config::CacheConfig;
use super::stats::{CacheStats, MetricsCollector};
use crate::error::ConfigResult;
use crate::time::{Clock, SystemClock};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

#[derive(Debug)]
struct CacheStorage<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    /// Keys in insertion order, oldest first
    insertion_order: VecDeque<K>,
}

impl<K, V> CacheStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    fn new() -> Self {
        Self { entries: HashMap::new(), insertion_order: VecDeque::new() }
    }

    fn remove(&mut self, key: &K) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.insertion_order.retain(|k| k != key);
        Some(entry)
    }
}

/// Thread-safe FIFO cache with optional TTL
///
/// # Example
/// ```
/// use walletscope_resilience::cache::{CacheConfig, TtlCache};
///
/// let cache: TtlCache<String, u64> = TtlCache::new(CacheConfig::bounded(2)).unwrap();
/// cache.insert("a".to_string(), 1);
/// cache.insert("b".to_string(), 2);
/// cache.insert("c".to_string(), 3);
/// assert_eq!(cache.get(&"a".to_string()), None);
/// assert_eq!(cache.get(&"c".to_string()), Some(3));
/// ```
pub struct TtlCache<K, V, C = SystemClock> {
    storage: Arc<Mutex<CacheStorage<K, V>>>,
    config: CacheConfig,
    metrics: MetricsCollector,
    clock: C,
}

impl<K, V, C> fmt::Debug for TtlCache<K, V, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlCache")
            .field("config", &self.config)
            .field("len", &self.storage.lock().entries.len())
            .finish_non_exhaustive()
    }
}

impl<K, V, C: Clone> Clone for TtlCache<K, V, C> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            config: self.config,
            metrics: self.metrics.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<K, V> TtlCache<K, V, SystemClock>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache using the system clock
    pub fn new(config: CacheConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<K, V, C> TtlCache<K, V, C>
where
    K: Eq + Hash + Clone,
    V: Clone,
    C: Clock,
{
    /// Create a cache with a custom clock (useful for testing)
    pub fn with_clock(config: CacheConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            storage: Arc::new(Mutex::new(CacheStorage::new())),
            config,
            metrics: MetricsCollector::default(),
            clock,
        })
    }

    /// The configuration in use
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Store `value` under `key`, evicting the oldest insertion if the cache
    /// is over capacity afterwards
    pub fn insert(&self, key: K, value: V) {
        let now = self.clock.now();
        let mut storage = self.storage.lock();

        if storage.entries.contains_key(&key) {
            storage.insertion_order.retain(|k| k != &key);
        }
        storage.entries.insert(key.clone(), CacheEntry { value, inserted_at: now });
        storage.insertion_order.push_back(key);
        self.metrics.record_insert();

        while storage.entries.len() > self.config.max_size {
            let Some(oldest) = storage.insertion_order.pop_front() else {
                break;
            };
            if storage.entries.remove(&oldest).is_some() {
                self.metrics.record_eviction();
                trace!("Evicted oldest cache entry");
            }
        }
    }

    /// Fetch a fresh value
    ///
    /// A stale entry is removed and reported as a miss.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let mut storage = self.storage.lock();

        let fresh = match storage.entries.get(key) {
            None => {
                self.metrics.record_miss();
                return None;
            }
            Some(entry) => self.is_fresh(entry, now),
        };

        if fresh {
            self.metrics.record_hit();
            storage.entries.get(key).map(|entry| entry.value.clone())
        } else {
            storage.remove(key);
            self.metrics.record_expirations(1);
            self.metrics.record_miss();
            None
        }
    }

    /// Whether a fresh entry exists for `key`, without touching statistics
    pub fn contains_key(&self, key: &K) -> bool {
        let now = self.clock.now();
        self.storage.lock().entries.get(key).is_some_and(|entry| self.is_fresh(entry, now))
    }

    /// Remove an entry, returning its value even if stale
    pub fn remove(&self, key: &K) -> Option<V> {
        self.storage.lock().remove(key).map(|entry| entry.value)
    }

    /// Remove every entry
    pub fn clear(&self) {
        let mut storage = self.storage.lock();
        storage.entries.clear();
        storage.insertion_order.clear();
    }

    /// Number of stored entries, including stale ones not yet removed
    pub fn len(&self) -> usize {
        self.storage.lock().entries.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every stale entry, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let Some(ttl) = self.config.ttl else {
            return 0;
        };
        let now = self.clock.now();
        let mut storage = self.storage.lock();

        let before = storage.entries.len();
        storage.entries.retain(|_, entry| now.saturating_duration_since(entry.inserted_at) < ttl);
        let CacheStorage { entries, insertion_order } = &mut *storage;
        insertion_order.retain(|key| entries.contains_key(key));

        let removed = before - storage.entries.len();
        self.metrics.record_expirations(removed as u64);
        removed
    }

    /// Snapshot of cache statistics
    pub fn stats(&self) -> CacheStats {
        self.metrics.snapshot(self.len(), self.config.max_size)
    }

    fn is_fresh(&self, entry: &CacheEntry<V>, now: Instant) -> bool {
        self.config.ttl.map_or(true, |ttl| now.saturating_duration_since(entry.inserted_at) < ttl)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::time::MockClock;

    type TestCache = TtlCache<String, u32, MockClock>;

    fn cache(max_size: usize, ttl_ms: Option<u64>) -> (TestCache, MockClock) {
        let clock = MockClock::new();
        let config = CacheConfig { max_size, ttl: ttl_ms.map(Duration::from_millis) };
        let cache = TtlCache::with_clock(config, clock.clone()).expect("valid config");
        (cache, clock)
    }

    fn key(name: &str) -> String {
        name.to_string()
    }

    /// Validates FIFO eviction ignores read recency.
    ///
    /// Assertions:
    /// - Confirms reading `a` does not protect it from eviction.
    /// - Confirms the eviction counter increments.
    #[test]
    fn test_fifo_eviction_ignores_reads() {
        let (cache, _clock) = cache(2, None);
        cache.insert(key("a"), 1);
        cache.insert(key("b"), 2);
        assert_eq!(cache.get(&key("a")), Some(1));

        cache.insert(key("c"), 3);

        assert_eq!(cache.get(&key("a")), None);
        assert_eq!(cache.get(&key("b")), Some(2));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 1);
    }

    /// Validates that re-inserting a key refreshes its position.
    ///
    /// Assertions:
    /// - Confirms `b` becomes the oldest entry after `a` is re-inserted.
    #[test]
    fn test_reinsert_moves_key_to_back() {
        let (cache, _clock) = cache(2, None);
        cache.insert(key("a"), 1);
        cache.insert(key("b"), 2);
        cache.insert(key("a"), 10);
        cache.insert(key("c"), 3);

        assert_eq!(cache.get(&key("a")), Some(10));
        assert_eq!(cache.get(&key("b")), None);
    }

    /// Validates TTL boundaries.
    ///
    /// Assertions:
    /// - Confirms an entry is fresh just before the TTL.
    /// - Confirms it is stale exactly at the TTL and counted as expired.
    #[test]
    fn test_ttl_expiration_boundary() {
        let (cache, clock) = cache(10, Some(1000));
        cache.insert(key("price"), 42);

        clock.advance_millis(999);
        assert_eq!(cache.get(&key("price")), Some(42));

        clock.advance_millis(1);
        assert_eq!(cache.get(&key("price")), None);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().expirations, 1);
    }

    /// Validates `cleanup_expired` removes only stale entries.
    ///
    /// Assertions:
    /// - Confirms one entry is removed and one survives.
    #[test]
    fn test_cleanup_expired() {
        let (cache, clock) = cache(10, Some(100));
        cache.insert(key("old"), 1);
        clock.advance_millis(60);
        cache.insert(key("new"), 2);
        clock.advance_millis(60);

        assert_eq!(cache.cleanup_expired(), 1);
        assert!(cache.contains_key(&key("new")));
        assert!(!cache.contains_key(&key("old")));
    }

    /// Validates hit and miss accounting.
    ///
    /// Assertions:
    /// - Confirms one hit, one miss and a hit rate of 0.5.
    #[test]
    fn test_stats_tracking() {
        let (cache, _clock) = cache(10, None);
        cache.insert(key("a"), 1);
        let _ = cache.get(&key("a"));
        let _ = cache.get(&key("missing"));

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.inserts), (1, 1, 1));
        assert!((stats.hit_rate() - 0.5).abs() < 1e-10);
    }

    /// Validates clones share storage.
    ///
    /// Assertions:
    /// - Confirms a value inserted through a clone is visible to the original.
    #[test]
    fn test_clone_shares_storage() {
        let (cache, _clock) = cache(10, None);
        let clone = cache.clone();
        clone.insert(key("shared"), 5);

        assert_eq!(cache.get(&key("shared")), Some(5));
        assert_eq!(cache.remove(&key("shared")), Some(5));
        assert!(clone.is_empty());
    }
}
