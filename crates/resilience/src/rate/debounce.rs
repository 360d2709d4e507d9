//! Trailing-edge debounce

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::error::{ConfigError, ConfigResult};

/// Debounce activity counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebounceStats {
    /// Calls received
    pub calls: u64,
    /// Times the wrapped function actually ran
    pub invocations: u64,
    /// Scheduled invocations replaced by a later call or cancelled
    pub superseded: u64,
}

struct DebounceState {
    generation: u64,
    pending: Option<JoinHandle<()>>,
}

struct DebounceInner<A> {
    func: Box<dyn Fn(A) + Send + Sync>,
    delay: Duration,
    runtime: Handle,
    state: Mutex<DebounceState>,
    calls: AtomicU64,
    invocations: AtomicU64,
    superseded: AtomicU64,
}

/// Delays a function until calls stop arriving for `delay`
///
/// Each call cancels the pending invocation and schedules a new one with its
/// own arguments, so only the last call in a burst runs. A pending
/// invocation still fires if every `Debounce` handle is dropped.
pub struct Debounce<A> {
    inner: Arc<DebounceInner<A>>,
}

impl<A> Clone for Debounce<A> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<A> fmt::Debug for Debounce<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debounce")
            .field("delay", &self.inner.delay)
            .field("pending", &self.is_pending())
            .finish_non_exhaustive()
    }
}

impl<A: Send + 'static> Debounce<A> {
    /// Wrap `func`; must be called from within a tokio runtime
    pub fn new<F>(func: F, delay: Duration) -> ConfigResult<Self>
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        let runtime = Handle::try_current()
            .map_err(|_| ConfigError::MissingRuntime { component: "Debounce" })?;

        Ok(Self {
            inner: Arc::new(DebounceInner {
                func: Box::new(func),
                delay,
                runtime,
                state: Mutex::new(DebounceState { generation: 0, pending: None }),
                calls: AtomicU64::new(0),
                invocations: AtomicU64::new(0),
                superseded: AtomicU64::new(0),
            }),
        })
    }

    /// Schedule `func(args)` after the delay, replacing any pending call
    pub fn call(&self, args: A) {
        self.inner.calls.fetch_add(1, Ordering::Relaxed);

        let mut state = self.inner.state.lock();
        state.generation = state.generation.wrapping_add(1);
        let generation = state.generation;

        if let Some(previous) = state.pending.take() {
            previous.abort();
            self.inner.superseded.fetch_add(1, Ordering::Relaxed);
            trace!("Debounced call superseded");
        }

        let inner = Arc::clone(&self.inner);
        state.pending = Some(self.inner.runtime.spawn(async move {
            tokio::time::sleep(inner.delay).await;
            {
                let mut state = inner.state.lock();
                if state.generation != generation {
                    return;
                }
                state.pending = None;
            }
            inner.invocations.fetch_add(1, Ordering::Relaxed);
            (inner.func)(args);
        }));
    }

    /// Drop the pending invocation, if any
    pub fn cancel(&self) -> bool {
        let mut state = self.inner.state.lock();
        state.generation = state.generation.wrapping_add(1);
        match state.pending.take() {
            Some(pending) => {
                pending.abort();
                self.inner.superseded.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }
}

impl<A> Debounce<A> {
    /// Whether an invocation is scheduled
    pub fn is_pending(&self) -> bool {
        self.inner.state.lock().pending.is_some()
    }

    pub fn delay(&self) -> Duration {
        self.inner.delay
    }

    pub fn stats(&self) -> DebounceStats {
        DebounceStats {
            calls: self.inner.calls.load(Ordering::Relaxed),
            invocations: self.inner.invocations.load(Ordering::Relaxed),
            superseded: self.inner.superseded.load(Ordering::Relaxed),
        }
    }
}
