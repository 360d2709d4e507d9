//! Bounded-concurrency task queue
//!
//! [`ConcurrencyQueue`] limits how many submitted tasks run at once while
//! accepting any number of submissions. Each submission returns a
//! [`TaskHandle`] that resolves with the task's own result.

mod core;
pub mod metrics;
mod types;

pub use self::core::ConcurrencyQueue;
pub use self::metrics::{QueueMetrics, QueueMetricsSnapshot};
pub use self::types::{QueueConfig, TaskHandle};
