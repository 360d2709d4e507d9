//! Shared doubles for the integration tests

#![allow(dead_code)]

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Invocation counter shared between a test and its operation
#[derive(Debug, Clone, Default)]
pub struct Calls(Arc<AtomicU32>);

impl Calls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a call, returning its 1-based sequence number
    pub fn record(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn count(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Error returned by the test doubles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamError {
    pub message: String,
    pub retryable: bool,
}

impl UpstreamError {
    pub fn transient(message: &str) -> Self {
        Self { message: message.to_string(), retryable: true }
    }

    pub fn permanent(message: &str) -> Self {
        Self { message: message.to_string(), retryable: false }
    }
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for UpstreamError {}

/// Operation that fails `failures` times, then returns `value`
///
/// Every invocation is recorded on `calls`.
pub fn flaky<T>(
    calls: &Calls,
    failures: u32,
    value: T,
) -> impl FnMut() -> std::future::Ready<Result<T, UpstreamError>>
where
    T: Clone,
{
    let calls = calls.clone();
    move || {
        let attempt = calls.record();
        std::future::ready(if attempt <= failures {
            Err(UpstreamError::transient(&format!("attempt {attempt} failed")))
        } else {
            Ok(value.clone())
        })
    }
}

/// Operation that always fails
pub fn always_failing(
    calls: &Calls,
) -> impl FnMut() -> std::future::Ready<Result<u32, UpstreamError>> {
    let calls = calls.clone();
    move || {
        let attempt = calls.record();
        std::future::ready(Err(UpstreamError::transient(&format!("attempt {attempt} failed"))))
    }
}

/// Async operation that counts its invocation and then sleeps
pub fn slow_success<T: Send + 'static>(
    calls: &Calls,
    delay: std::time::Duration,
    value: T,
) -> impl Future<Output = Result<T, UpstreamError>> + Send + 'static {
    let calls = calls.clone();
    async move {
        calls.record();
        tokio::time::sleep(delay).await;
        Ok(value)
    }
}
