//! Timeout racing for async operations
//!
//! [`with_timeout`] races an operation against a timer. When the timer wins
//! the operation is left running on the runtime and its eventual result is
//! discarded; callers that want the operation dropped instead use
//! [`with_deadline`].

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tracing::{debug, instrument, warn};

use crate::error::{ConfigError, ConfigResult, ResilienceError, ResilienceResult};
use crate::resilience::safe::panic_message;

/// Message used when the caller does not provide one
pub const DEFAULT_TIMEOUT_MESSAGE: &str = "Operation timed out";

/// Default timeout and message for a guarded call site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// How long to wait before failing the call
    #[serde(with = "crate::utils::serde::duration_millis")]
    pub timeout: Duration,
    /// Message carried by the timeout error
    pub message: String,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(5), message: DEFAULT_TIMEOUT_MESSAGE.to_string() }
    }
}

impl TimeoutConfig {
    /// Create a configuration with the default message
    pub fn new(timeout: Duration) -> Self {
        Self { timeout, ..Self::default() }
    }

    /// Replace the timeout message
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.timeout.is_zero() {
            return Err(ConfigError::invalid("timeout must be greater than 0"));
        }
        Ok(())
    }

    /// Race `future` against this configuration's timeout
    pub async fn run<Fut, T, E>(&self, future: Fut) -> ResilienceResult<T, E>
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        with_timeout(future, self.timeout, self.message.clone()).await
    }
}

/// Race `future` against a timer without cancelling it
///
/// The future is spawned onto the current tokio runtime. If it settles first
/// its result is returned (failures as [`ResilienceError::OperationFailed`]).
/// If the timer fires first the call fails with [`ResilienceError::Timeout`]
/// carrying `message`, and the spawned future keeps running detached.
///
/// Outside of a tokio runtime the future is never started and the call fails
/// with [`ResilienceError::Aborted`].
#[instrument(skip(future, message))]
pub async fn with_timeout<Fut, T, E>(
    future: Fut,
    timeout: Duration,
    message: impl Into<String>,
) -> ResilienceResult<T, E>
where
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let message = message.into();
    let Ok(runtime) = Handle::try_current() else {
        warn!("with_timeout called outside of a tokio runtime");
        return Err(ResilienceError::Aborted { reason: "no tokio runtime available".to_string() });
    };
    let task = runtime.spawn(future);

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(Ok(value))) => Ok(value),
        Ok(Ok(Err(error))) => {
            debug!("Guarded operation failed before the timeout");
            Err(ResilienceError::OperationFailed { source: error })
        }
        Ok(Err(join_error)) => {
            let reason = if join_error.is_panic() {
                format!("panicked: {}", panic_message(join_error.into_panic().as_ref()))
            } else {
                "task cancelled".to_string()
            };
            warn!(%reason, "Guarded operation aborted");
            Err(ResilienceError::Aborted { reason })
        }
        Err(_) => {
            // Dropping the JoinHandle detaches the task; it runs to completion.
            warn!(%message, "Operation lost the race against its timeout");
            Err(ResilienceError::Timeout { message, timeout })
        }
    }
}

/// Race `future` against a timer, dropping it if the timer wins
///
/// Unlike [`with_timeout`] the future does not need to be `'static` and is
/// cancelled at its next suspension point when the timeout elapses.
#[instrument(skip(future, message))]
pub async fn with_deadline<Fut, T, E>(
    future: Fut,
    timeout: Duration,
    message: impl Into<String>,
) -> ResilienceResult<T, E>
where
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(ResilienceError::OperationFailed { source: error }),
        Err(_) => {
            let message = message.into();
            warn!(%message, "Operation cancelled at its deadline");
            Err(ResilienceError::Timeout { message, timeout })
        }
    }
}
