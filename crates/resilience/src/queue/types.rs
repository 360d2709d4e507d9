use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::error::{ConfigError, ConfigResult, ResilienceError, ResilienceResult};

/// Queue sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of tasks executing at once
    pub concurrency: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

impl QueueConfig {
    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.concurrency == 0 {
            return Err(ConfigError::invalid("concurrency must be greater than 0"));
        }
        Ok(())
    }
}

/// What a queued job reports back through its completion channel
pub(crate) type TaskOutcome<T, E> = Result<Result<T, E>, String>;

/// Completion handle for a queued task
///
/// Resolves with the task's value, its error wrapped in
/// [`ResilienceError::OperationFailed`], or [`ResilienceError::Aborted`] if
/// the task panicked or was dropped by a shutting-down runtime.
#[derive(Debug)]
#[must_use = "a TaskHandle does nothing unless awaited"]
pub struct TaskHandle<T, E> {
    receiver: oneshot::Receiver<TaskOutcome<T, E>>,
}

impl<T, E> TaskHandle<T, E> {
    pub(crate) const fn new(receiver: oneshot::Receiver<TaskOutcome<T, E>>) -> Self {
        Self { receiver }
    }
}

impl<T, E> Future for TaskHandle<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    type Output = ResilienceResult<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver).poll(cx).map(|received| match received {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(source))) => Err(ResilienceError::OperationFailed { source }),
            Ok(Err(reason)) => Err(ResilienceError::Aborted { reason }),
            Err(_) => Err(ResilienceError::Aborted {
                reason: "task dropped before completion".to_string(),
            }),
        })
    }
}
