//! Integration tests for the resilience module
//!
//! Exercises retry, circuit breaker, polling, timeouts and safe execution
//! against failing test doubles, with time controlled by tokio's paused
//! clock or a `MockClock`.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{always_failing, flaky, Calls, UpstreamError};
use tokio::time::Instant;
use walletscope_resilience::resilience::{
    poll, retry, retry_with_policy, safe_run, with_timeout, CircuitBreaker, CircuitBreakerConfig,
    CircuitState, PollConfig, Poller, PredicateRetry, RetryConfig, RetryExecutor,
};
use walletscope_resilience::{MockClock, ResilienceError};

fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig::new()
        .max_attempts(max_attempts)
        .initial_delay(Duration::from_millis(10))
        .build()
        .expect("valid retry config")
}

/// Validates that retry gives up after the configured attempts.
///
/// # Test Steps
/// 1. Retry an always-failing operation with three attempts
/// 2. Record every observer notification
/// 3. Verify the operation ran three times and the observer saw attempts 1
///    and 2
/// 4. Verify the original error is returned
#[tokio::test(start_paused = true)]
async fn test_retry_exhaustion_invokes_max_attempts() {
    let calls = Calls::new();
    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&observed);

    let executor = RetryExecutor::new(fast_retry(3))
        .on_retry(move |attempt: u32, _: &UpstreamError| {
            sink.lock().expect("observer lock").push(attempt);
        });

    let result = executor.execute(always_failing(&calls)).await;

    assert_eq!(calls.count(), 3);
    assert_eq!(*observed.lock().expect("observer lock"), vec![1, 2]);
    let error = result.expect_err("should exhaust");
    assert_eq!(error.message, "attempt 3 failed");
}

/// Validates recovery after a single transient failure.
///
/// Assertions:
/// - Confirms the success value is returned after two invocations.
/// - Confirms the observer ran once, for attempt 1.
#[tokio::test(start_paused = true)]
async fn test_retry_recovers_after_one_failure() {
    let calls = Calls::new();
    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&observed);

    let executor = RetryExecutor::new(fast_retry(3))
        .on_retry(move |attempt: u32, _: &UpstreamError| {
            sink.lock().expect("observer lock").push(attempt);
        });

    let value = executor.execute(flaky(&calls, 1, "0xbalance")).await.expect("should recover");

    assert_eq!(value, "0xbalance");
    assert_eq!(calls.count(), 2);
    assert_eq!(*observed.lock().expect("observer lock"), vec![1]);
}

/// Validates the exponential backoff schedule.
///
/// With `initial_delay = 100ms`, multiplier 2 and equal jitter, the waits
/// fall in `[50, 100]` ms and then `[100, 200]` ms.
///
/// Assertions:
/// - Confirms both observed gaps are inside their jitter windows.
#[tokio::test(start_paused = true)]
async fn test_retry_backoff_schedule() {
    let config = RetryConfig::new()
        .max_attempts(3)
        .exponential_backoff(Duration::from_millis(100), 2.0, Duration::from_secs(10))
        .build()
        .expect("valid retry config");

    let stamps = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&stamps);
    let _ = retry(config, move || {
        recorder.lock().expect("stamp lock").push(Instant::now());
        std::future::ready(Err::<(), _>(UpstreamError::transient("down")))
    })
    .await;

    let stamps = stamps.lock().expect("stamp lock");
    assert_eq!(stamps.len(), 3);
    let first = stamps[1] - stamps[0];
    let second = stamps[2] - stamps[1];
    assert!((Duration::from_millis(50)..=Duration::from_millis(100)).contains(&first), "{first:?}");
    assert!(
        (Duration::from_millis(100)..=Duration::from_millis(200)).contains(&second),
        "{second:?}"
    );
}

/// Validates that a non-retryable error stops retrying immediately.
///
/// Assertions:
/// - Confirms a single invocation for a permanent error.
#[tokio::test(start_paused = true)]
async fn test_retry_policy_stops_on_permanent_error() {
    let calls = Calls::new();
    let counter = calls.clone();
    let policy = PredicateRetry::new(|error: &UpstreamError, _attempt: u32| error.retryable);

    let result = retry_with_policy(fast_retry(5), policy, move || {
        counter.record();
        std::future::ready(Err::<(), _>(UpstreamError::permanent("invalid address")))
    })
    .await;

    assert!(result.is_err());
    assert_eq!(calls.count(), 1);
}

/// Validates that an open circuit short-circuits calls.
///
/// # Test Steps
/// 1. Build a breaker with threshold 2 and a 1s cooldown
/// 2. Fail twice to open it
/// 3. Call again before the cooldown
/// 4. Verify `CircuitOpen` is returned and the operation was not invoked
#[tokio::test]
async fn test_breaker_opens_and_rejects() {
    let clock = MockClock::new();
    let breaker = CircuitBreaker::builder()
        .failure_threshold(2)
        .cooldown(Duration::from_millis(1000))
        .clock(clock.clone())
        .build()
        .expect("valid breaker");
    let calls = Calls::new();
    let mut op = always_failing(&calls);

    for _ in 0..2 {
        let result = breaker.execute(&mut op).await;
        assert!(matches!(result, Err(ResilienceError::OperationFailed { .. })));
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    clock.advance_millis(999);
    let rejected = breaker.execute(&mut op).await;

    assert!(rejected.expect_err("circuit should be open").is_circuit_open());
    assert_eq!(calls.count(), 2);
    assert_eq!(breaker.metrics().rejected_calls, 1);
}

/// Validates recovery once the cooldown has elapsed.
///
/// Assertions:
/// - Confirms the trial call reaches the operation and closes the circuit.
/// - Confirms the failure count was reset, so one new failure keeps it
///   closed and a second reopens it.
#[tokio::test]
async fn test_breaker_recovers_after_cooldown() {
    let clock = MockClock::new();
    let breaker = CircuitBreaker::builder()
        .failure_threshold(2)
        .cooldown(Duration::from_millis(1000))
        .clock(clock.clone())
        .build()
        .expect("valid breaker");
    let calls = Calls::new();
    let fail = || std::future::ready(Err::<u32, _>(UpstreamError::transient("rpc down")));

    let _ = breaker.execute(fail).await;
    let _ = breaker.execute(fail).await;
    assert_eq!(breaker.state(), CircuitState::Open);

    clock.advance_millis(1000);
    let counter = calls.clone();
    let value = breaker
        .execute(move || {
            counter.record();
            std::future::ready(Ok::<_, UpstreamError>(7))
        })
        .await
        .expect("trial call should pass");

    assert_eq!(value, 7);
    assert_eq!(calls.count(), 1);
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.failure_count(), 0);

    let _ = breaker.execute(fail).await;
    assert_eq!(breaker.state(), CircuitState::Closed);
    let _ = breaker.execute(fail).await;
    assert_eq!(breaker.state(), CircuitState::Open);
}

/// Validates polling exhaustion.
///
/// Assertions:
/// - Confirms exactly five invocations for `max_attempts = 5`.
/// - Confirms `PollExceeded { attempts: 5 }`.
#[tokio::test(start_paused = true)]
async fn test_poll_exhaustion() {
    let calls = Calls::new();
    let counter = calls.clone();
    let config = PollConfig::new(Duration::from_millis(100), 5).expect("valid poll config");

    let result = poll(
        config,
        move || {
            let n = counter.record();
            std::future::ready(Ok::<_, UpstreamError>(n))
        },
        |_| false,
    )
    .await;

    assert_eq!(calls.count(), 5);
    assert!(matches!(result, Err(ResilienceError::PollExceeded { attempts: 5 })));
}

/// Validates polling until a transaction is confirmed.
///
/// Assertions:
/// - Confirms the matching result is returned on the third attempt.
/// - Confirms the observer saw each attempt.
#[tokio::test(start_paused = true)]
async fn test_poll_until_confirmed() {
    let calls = Calls::new();
    let counter = calls.clone();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let poller = Poller::new(PollConfig::new(Duration::from_millis(250), 10).expect("valid"))
        .on_poll(move |attempt: u32, _: &u32| sink.lock().expect("lock").push(attempt));

    let confirmations = poller
        .poll(
            move || {
                let n = counter.record();
                std::future::ready(Ok::<_, UpstreamError>(n * 4))
            },
            |confirmations| *confirmations >= 12,
        )
        .await
        .expect("should confirm");

    assert_eq!(confirmations, 12);
    assert_eq!(*seen.lock().expect("lock"), vec![1, 2, 3]);
}

/// Validates the settled pair from `safe_run`.
///
/// Assertions:
/// - Confirms a failure yields `(Some(error), None)`.
/// - Confirms a success yields `(None, Some(value))`.
#[tokio::test]
async fn test_safe_run_settles() {
    let (error, value) =
        safe_run(|| async { Err::<u32, _>(UpstreamError::transient("indexer lagging")) }).await;
    assert!(matches!(error, Some(ResilienceError::OperationFailed { .. })));
    assert!(value.is_none());

    let (error, value) = safe_run(|| async { Ok::<_, UpstreamError>(21) }).await;
    assert!(error.is_none());
    assert_eq!(value, Some(21));
}

/// Validates that a timed-out operation keeps running in the background.
///
/// Assertions:
/// - Confirms a `Timeout` error with the supplied message.
/// - Confirms the operation still completes after the timeout fired.
#[tokio::test(start_paused = true)]
async fn test_timeout_leaves_loser_running() {
    let finished = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&finished);

    let result = with_timeout(
        async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            flag.store(true, Ordering::SeqCst);
            Ok::<_, UpstreamError>(())
        },
        Duration::from_millis(50),
        "price feed timed out",
    )
    .await;

    match result {
        Err(ResilienceError::Timeout { message, timeout }) => {
            assert_eq!(message, "price feed timed out");
            assert_eq!(timeout, Duration::from_millis(50));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(!finished.load(Ordering::SeqCst));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(finished.load(Ordering::SeqCst));
}

/// Validates stacking retry, timeout and breaker.
///
/// # Test Steps
/// 1. Wrap an always-failing call in a breaker (threshold 1) and a timeout
/// 2. Retry the stack, stopping once the circuit is open
/// 3. Verify the upstream ran once and the flattened error is `CircuitOpen`
#[tokio::test(start_paused = true)]
async fn test_composed_stack_stops_on_open_circuit() {
    let config = CircuitBreakerConfig::builder()
        .failure_threshold(1)
        .cooldown(Duration::from_secs(60))
        .build()
        .expect("valid config");
    let breaker = CircuitBreaker::new(config).expect("valid breaker");
    let calls = Calls::new();
    let policy = PredicateRetry::new(|error: &ResilienceError<UpstreamError>, _attempt: u32| {
        !error.is_circuit_open()
    });

    let result = retry_with_policy(fast_retry(5), policy, || {
        let breaker = breaker.clone();
        let calls = calls.clone();
        async move {
            with_timeout(
                async move {
                    breaker
                        .execute(|| {
                            calls.record();
                            std::future::ready(Err::<u32, _>(UpstreamError::transient("down")))
                        })
                        .await
                },
                Duration::from_secs(1),
                "stack timed out",
            )
            .await
            .map_err(|error| error.flatten())
        }
    })
    .await;

    assert!(result.expect_err("should fail").is_circuit_open());
    assert_eq!(calls.count(), 1);
}
