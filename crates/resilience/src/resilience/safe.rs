//! Safe execution: run an operation and hand back a settled pair instead of
//! propagating its failure.
//!
//! Exactly one slot of the returned [`Settled`] pair is populated. Errors
//! returned by the operation become [`ResilienceError::OperationFailed`];
//! panics are caught and become [`ResilienceError::Aborted`].

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};

use futures::FutureExt;
use tracing::{debug, warn};

use crate::error::{ResilienceError, ResilienceResult};

/// `(error, value)` pair produced by [`safe_run`]
pub type Settled<T, E> = (Option<ResilienceError<E>>, Option<T>);

/// Run an async operation, converting failures and panics into a settled pair
pub async fn safe_run<F, Fut, T, E>(operation: F) -> Settled<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let outcome = AssertUnwindSafe(async move { operation().await }).catch_unwind().await;
    settle(outcome)
}

/// Run a synchronous operation, converting failures and panics into a settled
/// pair
pub fn safe_run_sync<F, T, E>(operation: F) -> Settled<T, E>
where
    F: FnOnce() -> Result<T, E>,
    E: std::error::Error + Send + Sync + 'static,
{
    settle(panic::catch_unwind(AssertUnwindSafe(operation)))
}

/// Turn a settled pair back into a `Result`
///
/// A pair with neither slot populated is only possible if it was built by
/// hand; it is reported as [`ResilienceError::Aborted`].
pub fn settled_into_result<T, E>(settled: Settled<T, E>) -> ResilienceResult<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    match settled {
        (Some(error), _) => Err(error),
        (None, Some(value)) => Ok(value),
        (None, None) => {
            Err(ResilienceError::Aborted { reason: "settled pair carried no value".to_string() })
        }
    }
}

fn settle<T, E>(outcome: Result<Result<T, E>, Box<dyn Any + Send>>) -> Settled<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    match outcome {
        Ok(Ok(value)) => (None, Some(value)),
        Ok(Err(error)) => {
            debug!(error = %error, "Safe execution captured an operation failure");
            (Some(ResilienceError::OperationFailed { source: error }), None)
        }
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            warn!(%reason, "Safe execution captured a panic");
            (Some(ResilienceError::Aborted { reason: format!("panicked: {reason}") }), None)
        }
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
