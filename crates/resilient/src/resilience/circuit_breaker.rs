//! Two-state circuit breaker with a timed reset window
//!
//! A breaker is either `Closed` (calls go through) or `Open` (calls are
//! rejected without invoking the operation):
//!
//! - Closed: each failure increments the count; reaching the threshold opens
//!   the circuit and stamps the window start.
//! - Open: once `window` has elapsed since the window start, the next
//!   admission check closes the circuit with a zeroed count and lets the
//!   call through as fresh. Before that, calls fail with
//!   [`ResilienceError::CircuitOpen`].
//!
//! Successes never lower the count; only the elapsed window clears it. There
//! is no half-open probe state.
//!
//! State lives in a process-wide store keyed by [`PolicyKey`]. Binding a
//! [`Circuit`] without a key gives the protected operation its own record;
//! binding with [`Circuit::with_key`] shares one record between every
//! operation using that name.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, instrument};

use super::clock::{Clock, SystemClock};
use super::compose::{AsyncOperation, BlockingOperation, Decorator};
use super::store::{KeyedStore, PolicyKey};
use crate::error::{ResilienceError, ResilienceResult};
use crate::result::{Failure, Outcome};

static CIRCUITS: Lazy<KeyedStore<CircuitRecord>> = Lazy::new(KeyedStore::new);

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls go through
    Closed,
    /// Calls are rejected until the window elapses
    Open,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
        }
    }
}

/// Circuit breaker policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Circuit {
    failures: u32,
    window: Duration,
    key: Option<Arc<str>>,
}

impl Default for Circuit {
    fn default() -> Self {
        Self { failures: 5, window: Duration::from_secs(300), key: None }
    }
}

impl Circuit {
    /// Open after `failures` failures; stay open for `window`
    ///
    /// # Errors
    ///
    /// Returns [`ResilienceError::InvalidConfiguration`] when `failures` is 0.
    pub fn new(failures: u32, window: Duration) -> ResilienceResult<Self> {
        if failures == 0 {
            return Err(ResilienceError::invalid("circuit failure threshold must be at least 1"));
        }
        Ok(Self { failures, window, key: None })
    }

    /// Quick trip: 3 failures, 60s window
    pub fn fast() -> Self {
        Self { failures: 3, window: Duration::from_secs(60), key: None }
    }

    /// 5 failures, 300s window
    pub fn standard() -> Self {
        Self::default()
    }

    /// Share state with every other binding using `key`
    #[must_use]
    pub fn with_key<S: AsRef<str>>(mut self, key: S) -> Self {
        self.key = Some(Arc::from(key.as_ref()));
        self
    }

    pub const fn failures(&self) -> u32 {
        self.failures
    }

    pub const fn window(&self) -> Duration {
        self.window
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Bind to a record using the system clock
    pub fn bind(&self) -> CircuitBreaker<SystemClock> {
        self.bind_with_clock(SystemClock)
    }

    /// Bind to a record using a custom clock
    ///
    /// Every binding of one shared key should use the same clock.
    pub fn bind_with_clock<C: Clock>(&self, clock: C) -> CircuitBreaker<C> {
        let key = PolicyKey::resolve(self.key.as_deref());
        let record = CIRCUITS.get_or_insert_with(&key, || CircuitRecord {
            state: CircuitState::Closed,
            failure_count: 0,
            window_start: None,
            threshold: self.failures,
            window: self.window,
        });
        CircuitBreaker { key, record, clock: Arc::new(clock) }
    }
}

#[derive(Debug)]
struct CircuitRecord {
    state: CircuitState,
    failure_count: u32,
    window_start: Option<Instant>,
    threshold: u32,
    window: Duration,
}

/// Point-in-time view of a breaker's record
#[derive(Debug, Clone)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    pub failure_count: u32,
    pub threshold: u32,
    pub window: Duration,
    pub opened_at: Option<Instant>,
}

/// A [`Circuit`] bound to its keyed record
pub struct CircuitBreaker<C: Clock = SystemClock> {
    key: PolicyKey,
    record: Arc<Mutex<CircuitRecord>>,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let record = self.record.lock();
        f.debug_struct("CircuitBreaker")
            .field("key", &self.key)
            .field("state", &record.state)
            .field("failure_count", &record.failure_count)
            .finish()
    }
}

impl<C: Clock> Clone for CircuitBreaker<C> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            record: Arc::clone(&self.record),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<C: Clock> CircuitBreaker<C> {
    pub const fn key(&self) -> &PolicyKey {
        &self.key
    }

    /// Admission check
    ///
    /// Closes an open circuit whose window has elapsed.
    ///
    /// # Errors
    ///
    /// Returns [`ResilienceError::CircuitOpen`] while the window is running.
    pub fn admit(&self) -> Result<(), ResilienceError> {
        let mut record = self.record.lock();
        if record.state == CircuitState::Closed {
            return Ok(());
        }

        let now = self.clock.now();
        let elapsed = record.window_start.map_or(Duration::MAX, |start| now.saturating_duration_since(start));
        if elapsed >= record.window {
            record.state = CircuitState::Closed;
            record.failure_count = 0;
            record.window_start = None;
            debug!(target: "resilient", key = %self.key, "circuit closed after window elapsed");
            return Ok(());
        }

        debug!(target: "resilient", key = %self.key, failures = record.failure_count, "circuit rejecting call");
        Err(ResilienceError::CircuitOpen {
            key: self.key.to_string(),
            failures: record.failure_count,
            threshold: record.threshold,
        })
    }

    /// Count a failed invocation
    pub fn record_failure(&self) {
        let mut record = self.record.lock();
        record.failure_count = record.failure_count.saturating_add(1);
        if record.state == CircuitState::Closed && record.failure_count >= record.threshold {
            record.state = CircuitState::Open;
            record.window_start = Some(self.clock.now());
            debug!(
                target: "resilient",
                key = %self.key,
                failures = record.failure_count,
                "circuit opened"
            );
        }
    }

    /// Successes leave the record untouched
    pub const fn record_success(&self) {}

    /// Current state, without applying window expiry
    pub fn state(&self) -> CircuitState {
        self.record.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.record.lock().failure_count
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let record = self.record.lock();
        CircuitBreakerMetrics {
            state: record.state,
            failure_count: record.failure_count,
            threshold: record.threshold,
            window: record.window,
            opened_at: record.window_start,
        }
    }

    /// Force the record back to closed with a zero count
    pub fn reset(&self) {
        let mut record = self.record.lock();
        record.state = CircuitState::Closed;
        record.failure_count = 0;
        record.window_start = None;
        debug!(target: "resilient", key = %self.key, "circuit manually reset");
    }

    /// Run an async operation under the breaker
    #[instrument(level = "debug", skip(self, operation), fields(key = %self.key))]
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Outcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<Failure>,
    {
        self.admit()?;
        let outcome = operation().await.map_err(Into::into);
        self.record(&outcome);
        outcome
    }

    /// Run a blocking operation under the breaker
    #[instrument(level = "debug", skip(self, operation), fields(key = %self.key))]
    pub fn call<F, T, E>(&self, operation: F) -> Outcome<T>
    where
        F: FnOnce() -> Result<T, E>,
        E: Into<Failure>,
    {
        self.admit()?;
        let outcome = operation().map_err(Into::into);
        self.record(&outcome);
        outcome
    }

    fn record<T>(&self, outcome: &Outcome<T>) {
        if outcome.is_err() {
            self.record_failure();
        } else {
            self.record_success();
        }
    }
}

impl<T: Send + 'static> Decorator<T> for Circuit {
    fn decorate(&self, inner: AsyncOperation<T>) -> AsyncOperation<T> {
        let breaker = Arc::new(self.bind());
        Arc::new(move || {
            let breaker = Arc::clone(&breaker);
            let inner = Arc::clone(&inner);
            async move { breaker.execute(|| inner()).await }.boxed()
        })
    }

    fn decorate_blocking(&self, inner: BlockingOperation<T>) -> BlockingOperation<T> {
        let breaker = self.bind();
        Arc::new(move || breaker.call(|| inner()))
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the circuit breaker
    //!
    //! Tests cover presets, threshold trips, rejection without invocation,
    //! window expiry on a mock clock, key isolation and sharing.

    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::resilience::clock::MockClock;

    fn failing(calls: &AtomicU32) -> Result<(), Failure> {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(Failure::value("boom"))
    }

    /// Validates the documented presets.
    #[test]
    fn test_circuit_presets() {
        let default = Circuit::default();
        assert_eq!((default.failures(), default.window()), (5, Duration::from_secs(300)));
        let fast = Circuit::fast();
        assert_eq!((fast.failures(), fast.window()), (3, Duration::from_secs(60)));
        assert_eq!(Circuit::standard(), Circuit::default());
        assert!(Circuit::new(0, Duration::from_secs(1)).is_err());
    }

    /// Validates the trip, reject and reset cycle.
    ///
    /// Assertions:
    /// - The first two failures surface the operation's own error.
    /// - The third call is rejected and never invokes the operation.
    /// - After the window the next call runs fresh.
    #[test]
    fn test_trip_reject_and_window_reset() {
        let clock = MockClock::new();
        let breaker = Circuit::new(2, Duration::from_secs(60))
            .expect("valid circuit")
            .bind_with_clock(clock.clone());
        let calls = AtomicU32::new(0);

        for _ in 0..2 {
            let failure = breaker.call(|| failing(&calls)).unwrap_err();
            assert_eq!(failure.to_string(), "boom");
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let rejected = breaker.call(|| failing(&calls)).unwrap_err();
        assert!(rejected.is_circuit_open());
        assert!(rejected.to_string().contains("Circuit breaker open"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        clock.advance(Duration::from_secs(59));
        assert!(breaker.call(|| Ok::<_, Failure>(())).unwrap_err().is_circuit_open());

        clock.advance(Duration::from_secs(1));
        assert_eq!(breaker.call(|| Ok::<_, Failure>("fresh")).ok(), Some("fresh"));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }

    /// Validates successes below the threshold do not clear the count.
    #[test]
    fn test_success_does_not_decrement() {
        let breaker = Circuit::new(3, Duration::from_secs(60))
            .expect("valid circuit")
            .bind_with_clock(MockClock::new());
        let calls = AtomicU32::new(0);

        let _ = breaker.call(|| failing(&calls));
        let _ = breaker.call(|| Ok::<_, Failure>(()));
        let _ = breaker.call(|| failing(&calls));
        assert_eq!(breaker.failure_count(), 2);

        let _ = breaker.call(|| failing(&calls));
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    /// Validates anonymous bindings never share counters.
    #[test]
    fn test_unkeyed_bindings_isolated() {
        let policy = Circuit::new(1, Duration::from_secs(60)).expect("valid circuit");
        let first = policy.bind_with_clock(MockClock::new());
        let second = policy.bind_with_clock(MockClock::new());
        let calls = AtomicU32::new(0);

        let _ = first.call(|| failing(&calls));
        assert_eq!(first.state(), CircuitState::Open);
        assert_eq!(second.state(), CircuitState::Closed);
        assert_ne!(first.key(), second.key());
    }

    /// Validates a shared key shares one record and the first binding's
    /// configuration.
    #[test]
    fn test_shared_key() {
        let clock = MockClock::new();
        let first = Circuit::new(2, Duration::from_secs(60))
            .expect("valid circuit")
            .with_key("circuit-unit-shared")
            .bind_with_clock(clock.clone());
        let second = Circuit::new(10, Duration::from_secs(1))
            .expect("valid circuit")
            .with_key("circuit-unit-shared")
            .bind_with_clock(clock);
        let calls = AtomicU32::new(0);

        let _ = first.call(|| failing(&calls));
        let _ = second.call(|| failing(&calls));

        assert_eq!(first.state(), CircuitState::Open);
        assert!(second.call(|| Ok::<_, Failure>(())).unwrap_err().is_circuit_open());
        assert_eq!(second.metrics().threshold, 2);
    }

    /// Validates manual reset.
    #[test]
    fn test_manual_reset() {
        let breaker = Circuit::new(1, Duration::from_secs(600))
            .expect("valid circuit")
            .bind_with_clock(MockClock::new());
        let calls = AtomicU32::new(0);
        let _ = breaker.call(|| failing(&calls));
        assert!(breaker.metrics().opened_at.is_some());

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.call(|| Ok::<_, Failure>(1)).ok(), Some(1));
    }

    /// Validates the async path rejects without polling the operation.
    #[tokio::test]
    async fn test_execute_rejects_without_invoking() {
        let breaker = Circuit::new(1, Duration::from_secs(60))
            .expect("valid circuit")
            .bind_with_clock(MockClock::new());
        let calls = AtomicU32::new(0);

        let first = breaker.execute(|| async { failing(&calls) }).await;
        assert_eq!(first.unwrap_err().to_string(), "boom");

        let second = breaker.execute(|| async { failing(&calls) }).await;
        assert!(second.unwrap_err().is_circuit_open());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
