//! Resilience toolkit benchmarks
//!
//! Hot paths of the circuit breaker, backoff calculation, FIFO cache and
//! throttle, plus the async queue round trip.
//!
//! Run with: `cargo bench --bench resilience_bench -p walletscope-resilience`

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::runtime::Builder as RuntimeBuilder;
use walletscope_resilience::cache::{memoize, CacheConfig, MemoizeOptions, TtlCache};
use walletscope_resilience::queue::ConcurrencyQueue;
use walletscope_resilience::rate::Throttle;
use walletscope_resilience::resilience::{CircuitBreaker, CircuitBreakerConfig, Jitter, RetryConfig};
use walletscope_resilience::{MockClock, ResilienceError};

// ============================================================================
// Circuit Breaker Benchmarks
// ============================================================================

fn bench_circuit_breaker(c: &mut Criterion) {
    let mut group = c.benchmark_group("circuit_breaker");

    group.bench_function("call_success", |b| {
        let breaker = CircuitBreaker::default();
        b.iter(|| {
            let result: Result<_, ResilienceError<std::io::Error>> =
                breaker.call(|| Ok::<_, std::io::Error>(()));
            black_box(result)
        });
    });

    group.bench_function("open_short_circuit", |b| {
        let config = CircuitBreakerConfig::builder()
            .failure_threshold(1)
            .cooldown(Duration::from_secs(60))
            .build()
            .expect("valid circuit breaker config for benchmarks");
        let breaker = CircuitBreaker::new(config).expect("breaker should build");

        // Trip the breaker so it remains open for the benchmark iterations.
        let _ = breaker.call(|| Err::<(), _>(std::io::Error::other("initial failure")));

        b.iter(|| {
            let result: Result<_, ResilienceError<std::io::Error>> =
                breaker.call(|| Ok::<_, std::io::Error>(()));
            black_box(result)
        });
    });

    group.finish();
}

// ============================================================================
// Retry Benchmarks
// ============================================================================

fn bench_retry_backoff(c: &mut Criterion) {
    let mut group = c.benchmark_group("retry_backoff");
    let config = RetryConfig::default();

    for attempt in [1u32, 4, 16] {
        group.bench_with_input(BenchmarkId::new("delay_for_attempt", attempt), &attempt, |b, &a| {
            b.iter(|| black_box(config.delay_for_attempt(black_box(a))));
        });
    }

    for jitter in [Jitter::None, Jitter::Full, Jitter::Equal] {
        group.bench_with_input(
            BenchmarkId::new("jitter", format!("{jitter:?}")),
            &jitter,
            |b, &jitter| {
                b.iter(|| black_box(jitter.apply(Duration::from_millis(500))));
            },
        );
    }

    group.finish();
}

// ============================================================================
// Cache Benchmarks
// ============================================================================

fn bench_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache");

    group.bench_function("insert_with_eviction", |b| {
        let cache: TtlCache<u64, u64> =
            TtlCache::new(CacheConfig::bounded(1_000)).expect("valid cache config");
        let mut key = 0u64;
        b.iter(|| {
            key = key.wrapping_add(1);
            cache.insert(key, key);
        });
    });

    group.bench_function("get_hit", |b| {
        let cache: TtlCache<u64, u64> =
            TtlCache::new(CacheConfig::ttl_bounded(Duration::from_secs(60), 1_000))
                .expect("valid cache config");
        for key in 0..1_000 {
            cache.insert(key, key);
        }
        b.iter(|| black_box(cache.get(&black_box(500))));
    });

    group.bench_function("memoize_hit", |b| {
        let square = memoize(|n: u64| n * n, MemoizeOptions::new()).expect("valid options");
        square.call(42);
        b.iter(|| black_box(square.call(black_box(42))));
    });

    group.finish();
}

// ============================================================================
// Rate Shaping and Queue Benchmarks
// ============================================================================

fn bench_throttle(c: &mut Criterion) {
    c.bench_function("throttle_dropped_call", |b| {
        let sink = |n: u64| {
            black_box(n);
        };
        let throttle = Throttle::with_clock(sink, Duration::from_secs(1), MockClock::new());
        throttle.call(0);
        b.iter(|| black_box(throttle.call(black_box(1))));
    });
}

fn bench_queue_round_trip(c: &mut Criterion) {
    let runtime = RuntimeBuilder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("tokio runtime for benchmarks");
    let queue = runtime.block_on(async { ConcurrencyQueue::new(4) }).expect("queue");

    c.bench_function("queue_add_and_await", |b| {
        b.to_async(&runtime).iter(|| {
            let handle = queue.add(|| async { Ok::<_, std::io::Error>(1u32) });
            async move { black_box(handle.await.ok()) }
        });
    });
}

criterion_group!(
    resilience,
    bench_circuit_breaker,
    bench_retry_backoff,
    bench_cache,
    bench_throttle,
    bench_queue_round_trip
);
criterion_main!(resilience);
