use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, Notify};
use tracing::{debug, warn};

use super::metrics::{QueueMetrics, QueueMetricsSnapshot};
use super::types::{QueueConfig, TaskHandle};
use crate::error::{ConfigError, ConfigResult};
use crate::resilience::safe::panic_message;

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

struct QueueState {
    backlog: VecDeque<Job>,
    running: usize,
    /// Set while some caller is draining the backlog
    pumping: bool,
}

struct QueueInner {
    concurrency: usize,
    state: Mutex<QueueState>,
    runtime: Handle,
    metrics: Arc<QueueMetrics>,
    idle: Notify,
}

/// Bounded-concurrency task queue
///
/// At most `concurrency` tasks execute at once; further tasks wait in an
/// unbounded FIFO backlog and are started in submission order as running
/// tasks finish. Completion order is not guaranteed. Tasks run on the tokio
/// runtime captured at construction.
///
/// Clones share the same backlog and running count.
#[derive(Clone)]
pub struct ConcurrencyQueue {
    inner: Arc<QueueInner>,
}

impl fmt::Debug for ConcurrencyQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrencyQueue")
            .field("concurrency", &self.inner.concurrency)
            .field("running", &self.running())
            .field("size", &self.size())
            .finish()
    }
}

impl ConcurrencyQueue {
    /// Create a queue running at most `concurrency` tasks at once
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(concurrency: usize) -> ConfigResult<Self> {
        Self::with_config(QueueConfig { concurrency })
    }

    /// Create a queue from a [`QueueConfig`]
    pub fn with_config(config: QueueConfig) -> ConfigResult<Self> {
        config.validate()?;
        let runtime = Handle::try_current()
            .map_err(|_| ConfigError::MissingRuntime { component: "ConcurrencyQueue" })?;

        Ok(Self {
            inner: Arc::new(QueueInner {
                concurrency: config.concurrency,
                state: Mutex::new(QueueState { backlog: VecDeque::new(), running: 0, pumping: false }),
                runtime,
                metrics: Arc::new(QueueMetrics::new()),
                idle: Notify::new(),
            }),
        })
    }

    /// Submit a task
    ///
    /// The task starts immediately if a slot is free, otherwise it waits in
    /// the backlog. The returned handle resolves when the task settles.
    pub fn add<F, Fut, T, E>(&self, task: F) -> TaskHandle<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let metrics = Arc::clone(&self.inner.metrics);

        let job: Job = Box::new(move || {
            async move {
                let outcome = AssertUnwindSafe(async move { task().await }).catch_unwind().await;
                let outcome = match outcome {
                    Ok(Ok(value)) => {
                        metrics.record_completion();
                        Ok(Ok(value))
                    }
                    Ok(Err(error)) => {
                        metrics.record_failure();
                        Ok(Err(error))
                    }
                    Err(payload) => {
                        let reason = panic_message(payload.as_ref());
                        warn!(%reason, "Queued task panicked");
                        metrics.record_panic();
                        Err(format!("panicked: {reason}"))
                    }
                };
                // The caller may have dropped the handle; the result is discarded.
                let _ = sender.send(outcome);
            }
            .boxed()
        });

        let backlog = {
            let mut state = self.inner.state.lock();
            state.backlog.push_back(job);
            state.backlog.len()
        };
        self.inner.metrics.record_submit(backlog);

        pump(&self.inner);
        TaskHandle::new(receiver)
    }

    /// Number of tasks waiting to start
    pub fn size(&self) -> usize {
        self.inner.state.lock().backlog.len()
    }

    /// Number of tasks currently executing
    pub fn running(&self) -> usize {
        self.inner.state.lock().running
    }

    /// Maximum number of tasks executing at once
    pub fn concurrency(&self) -> usize {
        self.inner.concurrency
    }

    /// Whether nothing is running or waiting
    pub fn is_idle(&self) -> bool {
        is_idle(&self.inner.state.lock())
    }

    /// Wait until the backlog is empty and no task is running
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Snapshot of the queue's counters
    pub fn metrics(&self) -> QueueMetricsSnapshot {
        self.inner.metrics.snapshot()
    }
}

fn is_idle(state: &QueueState) -> bool {
    state.running == 0 && state.backlog.is_empty()
}

/// Start backlog tasks while slots are free
///
/// Only one caller drains at a time. A nested call, such as a slot released
/// while a shutting-down runtime drops a freshly spawned task, returns at once
/// and the active loop picks up the freed slot. The flag is cleared under the
/// same lock as the final slot check, so no freed slot is missed.
fn pump(inner: &Arc<QueueInner>) {
    {
        let mut state = inner.state.lock();
        if state.pumping {
            return;
        }
        state.pumping = true;
    }

    loop {
        let (job, running) = {
            let mut state = inner.state.lock();
            let next = if state.running < inner.concurrency {
                state.backlog.pop_front()
            } else {
                None
            };
            let Some(job) = next else {
                state.pumping = false;
                return;
            };
            state.running += 1;
            (job, state.running)
        };

        inner.metrics.record_start(running);
        debug!(running, "Starting queued task");

        let slot = RunningSlot { inner: Arc::clone(inner) };
        inner.runtime.spawn(async move {
            let _slot = slot;
            job().await;
        });
    }
}

/// Frees a running slot when its task finishes or is dropped
struct RunningSlot {
    inner: Arc<QueueInner>,
}

impl Drop for RunningSlot {
    fn drop(&mut self) {
        {
            let mut state = self.inner.state.lock();
            state.running = state.running.saturating_sub(1);
        }

        pump(&self.inner);

        if is_idle(&self.inner.state.lock()) {
            self.inner.idle.notify_waiters();
        }
    }
}
