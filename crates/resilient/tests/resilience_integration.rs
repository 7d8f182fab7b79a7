//! Integration tests for the resilience policies
//!
//! Tests backoff schedules, circuit breaking, rate limiting, retry and
//! deadlines on their own and composed around one operation.

#![cfg(feature = "runtime")]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use resilient::resilience::{blocking_operation, operation};
use resilient::testing::{assert_jittered, ScriptedOperation, Step};
use resilient::{
    assert_attempts, assert_failure_contains, compose, Backoff, BackoffStrategy, Circuit,
    CircuitState, Compose, Decorator, Failure, MockClock, Outcome, RateLimit, Retry,
    RetryExecutor, Timeout,
};

fn quick() -> Backoff {
    Backoff::fixed(Duration::from_millis(1)).without_jitter()
}

// ============================================================================
// Backoff
// ============================================================================

/// Validates a fixed schedule never grows.
#[test]
fn test_fixed_backoff_constant() {
    let backoff = Backoff::fixed(Duration::from_millis(250)).without_jitter();
    for attempt in [0, 1, 5, 50, 500] {
        assert_eq!(backoff.calculate(attempt), Duration::from_millis(250));
    }
}

/// Validates a linear schedule grows by the base delay.
#[test]
fn test_linear_backoff_grows() {
    let backoff = Backoff::linear(Duration::from_millis(500)).without_jitter();
    assert_eq!(backoff.strategy(), BackoffStrategy::Linear);
    assert_eq!(backoff.calculate(0), Duration::from_millis(500));
    assert_eq!(backoff.calculate(3), Duration::from_secs(2));
}

/// Validates exponential growth clamps at the cap.
///
/// # Test Steps
/// 1. Build base 1s, factor 2, cap 10s without jitter
/// 2. Compute attempts 0 through 5
/// 3. Confirm `min(b * f^n, m)` for each
#[test]
fn test_exponential_backoff_clamped() {
    let backoff = Backoff::exponential(Duration::from_secs(1), 2.0)
        .expect("valid factor")
        .with_max_delay(Duration::from_secs(10))
        .without_jitter();

    let delays: Vec<u64> = (0..6).map(|n| backoff.calculate(n).as_secs()).collect();
    assert_eq!(delays, vec![1, 2, 4, 8, 10, 10]);

    // Huge attempt indices saturate at the cap instead of overflowing.
    assert_eq!(backoff.calculate(u32::MAX), Duration::from_secs(10));
}

/// Validates jitter stays within `[0.5, 1.0)` of the computed delay and
/// actually varies.
#[test]
fn test_jitter_range_and_variation() {
    let backoff = Backoff::fixed(Duration::from_secs(1));
    assert!(backoff.jitter());

    let delays: Vec<Duration> = (0..64).map(|_| backoff.calculate(3)).collect();
    for delay in &delays {
        assert_jittered(*delay, Duration::from_secs(1));
    }
    assert!(delays.iter().any(|d| *d != delays[0]), "jittered delays should vary");
}

/// Validates invalid factors are rejected.
#[test]
fn test_backoff_rejects_bad_factor() {
    assert!(Backoff::exponential(Duration::from_secs(1), 0.0).is_err());
    assert!(Backoff::exponential(Duration::from_secs(1), f64::INFINITY).is_err());
}

// ============================================================================
// Circuit breaker
// ============================================================================

/// Validates the circuit trips after the threshold and the wrapped
/// operation is not invoked while open.
///
/// # Test Steps
/// 1. Bind threshold 2 / window 60s to a mock clock
/// 2. Fail twice and observe the original error each time
/// 3. Third call is rejected without invoking the operation
/// 4. Advance past the window; the next call runs fresh
#[tokio::test]
async fn test_circuit_trips_and_recovers() {
    let clock = MockClock::new();
    let breaker = Circuit::new(2, Duration::from_secs(60))
        .expect("valid circuit")
        .bind_with_clock(clock.clone());
    let op = ScriptedOperation::<&str>::always_failing("upstream refused");

    for _ in 0..2 {
        let outcome = breaker.execute(|| op.run()).await;
        assert_failure_contains!(outcome, "upstream refused");
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    let rejected = breaker.execute(|| op.run()).await;
    assert_failure_contains!(rejected, "Circuit breaker open");
    assert_attempts!(op.calls(), 2);

    clock.advance(Duration::from_secs(61));
    let healthy = ScriptedOperation::new([Step::Succeed("fresh")]);
    assert_eq!(breaker.execute(|| healthy.run()).await.ok(), Some("fresh"));
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.failure_count(), 0);
}

/// Validates two decorated operations never share circuit state unless
/// keyed together.
#[test]
fn test_circuit_isolation_by_key() {
    let policy = Circuit::new(1, Duration::from_secs(60)).expect("valid circuit");
    let failing = blocking_operation(|| Err::<(), _>(Failure::value("down")));
    let healthy = blocking_operation(|| Ok::<_, Failure>(()));

    let a = policy.decorate_blocking(Arc::clone(&failing));
    let b = policy.decorate_blocking(Arc::clone(&healthy));
    let _ = a();
    assert!(a().unwrap_err().is_circuit_open());
    assert!(b().is_ok());

    let shared = policy.with_key("integration-circuit-shared");
    let c = shared.decorate_blocking(failing);
    let d = shared.decorate_blocking(healthy);
    let _ = c();
    assert!(d().unwrap_err().is_circuit_open());
}

/// Validates concurrent failures against one key are all counted.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_circuit_concurrent_failures_counted() {
    let policy = Circuit::new(1_000, Duration::from_secs(60))
        .expect("valid circuit")
        .with_key("integration-circuit-concurrent");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let breaker = policy.bind();
            tokio::spawn(async move {
                for _ in 0..25 {
                    let _ = breaker.execute(|| async { Err::<(), _>(Failure::value("x")) }).await;
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.expect("task completed");
    }

    assert_eq!(policy.bind().failure_count(), 200);
}

// ============================================================================
// Rate limiter
// ============================================================================

/// Validates rps 50 / burst 1 spaces three calls by at least 20ms.
#[tokio::test]
async fn test_rate_limit_spacing() {
    let limiter = RateLimit::new(50.0, 1).expect("valid rate limit").bind();
    let started = Instant::now();
    for _ in 0..3 {
        limiter.execute(|| async { Ok::<_, Failure>(()) }).await.expect("admitted");
    }
    assert!(started.elapsed() >= Duration::from_millis(20));
}

/// Validates rps 25 / burst 3 admits three calls at once and makes the
/// fourth wait roughly one interval.
///
/// # Test Steps
/// 1. Time the first three calls
/// 2. Time the fourth
/// 3. Confirm burst is near-immediate and the fourth waits about 40ms
#[tokio::test]
async fn test_rate_limit_burst_then_wait() {
    let limiter = RateLimit::new(25.0, 3).expect("valid rate limit").bind();

    let started = Instant::now();
    for _ in 0..3 {
        limiter.acquire().await;
    }
    assert!(started.elapsed() < Duration::from_millis(30));

    let fourth = Instant::now();
    limiter.acquire().await;
    let waited = fourth.elapsed();
    assert!(waited >= Duration::from_millis(25), "waited only {waited:?}");
    assert!(waited < Duration::from_millis(200), "waited too long: {waited:?}");
}

/// Validates the blocking path waits too.
#[test]
fn test_rate_limit_blocking_call() {
    let limiter = RateLimit::new(20.0, 1).expect("valid rate limit").bind();
    let started = Instant::now();
    for _ in 0..2 {
        limiter.call(|| Ok::<_, Failure>(())).expect("admitted");
    }
    assert!(started.elapsed() >= Duration::from_millis(40));
}

// ============================================================================
// Retry and timeout
// ============================================================================

/// Validates attempts=2 on an operation failing once yields success after
/// exactly two invocations.
#[tokio::test]
async fn test_retry_recovers_after_one_failure() {
    let op = ScriptedOperation::failing_then(1, "transient", 42);
    let executor = RetryExecutor::new(Retry::new(2).expect("valid").with_backoff(quick()));

    let outcome = executor.execute(|| op.run()).await;
    assert_eq!(outcome.ok(), Some(42));
    assert_attempts!(op.calls(), 2);
}

/// Validates exhausted retries report the last failure as it was.
#[test]
fn test_retry_exhausted_blocking() {
    let op = ScriptedOperation::<u8>::always_failing("still down");
    let executor = RetryExecutor::new(Retry::new(3).expect("valid").with_backoff(quick()));

    let failure = executor.call(|| op.call()).unwrap_err();
    assert_eq!(failure.to_string(), "still down");
    assert!(!failure.is_fault());
    assert_attempts!(op.calls(), 3);
}

/// Validates a deadline abandons a slow future with the canonical message.
#[tokio::test]
async fn test_timeout_message() {
    let outcome = Timeout::new(Duration::from_millis(50))
        .execute(async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<_, Failure>(())
        })
        .await;
    assert_failure_contains!(outcome, "Timeout after 0.05s");
}

// ============================================================================
// Composition
// ============================================================================

/// Validates a composed stack: retry outside, circuit inside, timeout
/// innermost.
///
/// # Test Steps
/// 1. Compose retry(3) -> circuit(threshold 2) -> timeout
/// 2. Run an operation that always times out
/// 3. Confirm the circuit opened after two attempts and the third attempt
///    was rejected without running the operation
#[tokio::test]
async fn test_compose_retry_circuit_timeout() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let base = operation(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, Failure>(())
        }
    });

    let retry = Retry::new(3).expect("valid").with_backoff(quick());
    let circuit = Circuit::new(2, Duration::from_secs(60)).expect("valid circuit");
    let timeout = Timeout::new(Duration::from_millis(20));
    let layers: [&dyn Decorator<()>; 3] = [&retry, &circuit, &timeout];

    let composed = compose(&layers, base);
    let failure = composed().await.unwrap_err();

    assert!(failure.is_circuit_open());
    assert_failure_contains!(Err::<(), _>(failure), "Circuit breaker open");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// Validates the builder form matches nesting order.
#[test]
fn test_compose_builder_blocking() {
    let op = ScriptedOperation::failing_then(2, "flaky", "ok");
    let script = op.clone();
    let stack = Compose::new()
        .layer(Retry::new(3).expect("valid").with_backoff(quick()))
        .layer(Timeout::new(Duration::from_secs(5)));
    assert_eq!(stack.len(), 2);

    let wrapped = stack.wrap_blocking(blocking_operation(move || script.call()));
    let outcome: Outcome<&str> = wrapped();
    assert_eq!(outcome.ok(), Some("ok"));
    assert_attempts!(op.calls(), 3);
}
