//! Leading-edge throttle

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::time::{Clock, SystemClock};

/// Throttle activity counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleStats {
    pub invoked: u64,
    pub dropped: u64,
}

/// Runs a function at most once per `limit`
///
/// The first call runs immediately and opens a cooldown window; calls inside
/// the window are dropped, not deferred.
///
/// # Example
/// ```
/// use std::time::Duration;
///
/// use walletscope_resilience::rate::Throttle;
///
/// let throttle = Throttle::new(|msg: &str| println!("{msg}"), Duration::from_secs(1));
/// assert!(throttle.call("first"));
/// assert!(!throttle.call("too soon"));
/// ```
pub struct Throttle<F, C = SystemClock> {
    func: F,
    limit: Duration,
    clock: C,
    last_invoked: Mutex<Option<Instant>>,
    invoked: AtomicU64,
    dropped: AtomicU64,
}

impl<F, C> fmt::Debug for Throttle<F, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Throttle")
            .field("limit", &self.limit)
            .field("last_invoked", &*self.last_invoked.lock())
            .finish_non_exhaustive()
    }
}

impl<F> Throttle<F, SystemClock> {
    pub fn new(func: F, limit: Duration) -> Self {
        Self::with_clock(func, limit, SystemClock)
    }
}

impl<F, C: Clock> Throttle<F, C> {
    /// Create a throttle reading time from `clock`
    pub fn with_clock(func: F, limit: Duration, clock: C) -> Self {
        Self {
            func,
            limit,
            clock,
            last_invoked: Mutex::new(None),
            invoked: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Invoke `func(args)` unless inside the cooldown window
    ///
    /// Returns whether the function ran.
    pub fn call<A>(&self, args: A) -> bool
    where
        F: Fn(A),
    {
        let now = self.clock.now();
        {
            let mut last = self.last_invoked.lock();
            if last.is_some_and(|at| now.saturating_duration_since(at) < self.limit) {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return false;
            }
            *last = Some(now);
        }

        self.invoked.fetch_add(1, Ordering::Relaxed);
        (self.func)(args);
        true
    }

    /// Whether a call made now would be dropped
    pub fn is_throttled(&self) -> bool {
        let now = self.clock.now();
        self.last_invoked.lock().is_some_and(|at| now.saturating_duration_since(at) < self.limit)
    }

    /// Close the cooldown window so the next call runs
    pub fn reset(&self) {
        *self.last_invoked.lock() = None;
    }

    pub const fn limit(&self) -> Duration {
        self.limit
    }

    pub fn stats(&self) -> ThrottleStats {
        ThrottleStats {
            invoked: self.invoked.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}
