use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};

use serde::{Deserialize, Serialize};

/// Queue counters for monitoring
#[derive(Debug, Default)]
pub struct QueueMetrics {
    pub total_submitted: AtomicU64,
    pub total_started: AtomicU64,
    pub total_completed: AtomicU64,
    pub total_failed: AtomicU64,
    pub total_panicked: AtomicU64,
    pub peak_running: AtomicUsize,
    pub peak_backlog: AtomicUsize,
}

impl QueueMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a task entering the backlog
    pub fn record_submit(&self, backlog: usize) {
        self.total_submitted.fetch_add(1, AtomicOrdering::Relaxed);
        self.peak_backlog.fetch_max(backlog, AtomicOrdering::Relaxed);
    }

    /// Record a task being admitted to run
    pub fn record_start(&self, running: usize) {
        self.total_started.fetch_add(1, AtomicOrdering::Relaxed);
        self.peak_running.fetch_max(running, AtomicOrdering::Relaxed);
    }

    /// Record a task that resolved successfully
    pub fn record_completion(&self) {
        self.total_completed.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Record a task that resolved with an error
    pub fn record_failure(&self) {
        self.total_failed.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Record a task that panicked
    pub fn record_panic(&self) {
        self.total_panicked.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Get a point-in-time snapshot
    pub fn snapshot(&self) -> QueueMetricsSnapshot {
        QueueMetricsSnapshot {
            total_submitted: self.total_submitted.load(AtomicOrdering::Relaxed),
            total_started: self.total_started.load(AtomicOrdering::Relaxed),
            total_completed: self.total_completed.load(AtomicOrdering::Relaxed),
            total_failed: self.total_failed.load(AtomicOrdering::Relaxed),
            total_panicked: self.total_panicked.load(AtomicOrdering::Relaxed),
            peak_running: self.peak_running.load(AtomicOrdering::Relaxed),
            peak_backlog: self.peak_backlog.load(AtomicOrdering::Relaxed),
        }
    }
}

/// Serializable snapshot of [`QueueMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMetricsSnapshot {
    pub total_submitted: u64,
    pub total_started: u64,
    pub total_completed: u64,
    pub total_failed: u64,
    pub total_panicked: u64,
    pub peak_running: usize,
    pub peak_backlog: usize,
}

impl QueueMetricsSnapshot {
    /// Tasks that have finished in any way
    pub const fn total_finished(&self) -> u64 {
        self.total_completed + self.total_failed + self.total_panicked
    }
}
