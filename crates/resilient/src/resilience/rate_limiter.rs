//! Token bucket rate limiting
//!
//! Admission never rejects for lack of tokens. Each caller takes a
//! *reservation* under the bucket's lock: the bucket refills by elapsed time,
//! then either hands out a token immediately or books the next token to
//! accrue and tells the caller how long to wait for it. The lock is released
//! before the caller suspends, so waiters queue in reservation order without
//! blocking each other's bookkeeping.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::debug;

use super::clock::{Clock, SystemClock};
use super::compose::{AsyncOperation, BlockingOperation, Decorator};
use super::store::{KeyedStore, PolicyKey};
use crate::error::{ResilienceError, ResilienceResult};
use crate::result::{Failure, Outcome};

static BUCKETS: Lazy<KeyedStore<Bucket>> = Lazy::new(KeyedStore::new);

/// Rate limit policy: `rps` tokens per second, at most `burst` banked
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimit {
    rps: f64,
    burst: u32,
    key: Option<Arc<str>>,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self { rps: 1.0, burst: 1, key: None }
    }
}

impl RateLimit {
    /// # Errors
    ///
    /// Returns [`ResilienceError::InvalidConfiguration`] when `rps` is not a
    /// positive finite number or `burst` is 0.
    pub fn new(rps: f64, burst: u32) -> ResilienceResult<Self> {
        if !rps.is_finite() || rps <= 0.0 {
            return Err(ResilienceError::invalid(format!("rate limit rps must be positive, got {rps}")));
        }
        if burst == 0 {
            return Err(ResilienceError::invalid("rate limit burst must be at least 1"));
        }
        Ok(Self { rps, burst, key: None })
    }

    /// Share one bucket with every other binding using `key`
    #[must_use]
    pub fn with_key<S: AsRef<str>>(mut self, key: S) -> Self {
        self.key = Some(Arc::from(key.as_ref()));
        self
    }

    pub const fn rps(&self) -> f64 {
        self.rps
    }

    pub const fn burst(&self) -> u32 {
        self.burst
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn bind(&self) -> RateLimiter<SystemClock> {
        self.bind_with_clock(SystemClock)
    }

    pub fn bind_with_clock<C: Clock>(&self, clock: C) -> RateLimiter<C> {
        let key = PolicyKey::resolve(self.key.as_deref());
        let bucket = BUCKETS.get_or_insert_with(&key, || Bucket::new(self.burst, self.rps, clock.now()));
        RateLimiter { key, bucket, clock: Arc::new(clock) }
    }
}

/// Token state for one key
#[derive(Debug, Clone)]
pub struct Bucket {
    capacity: f64,
    rps: f64,
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    /// A full bucket
    pub fn new(capacity: u32, rps: f64, now: Instant) -> Self {
        let capacity = f64::from(capacity);
        Self { capacity, rps, tokens: capacity, last_refill: now }
    }

    pub const fn tokens(&self) -> f64 {
        self.tokens
    }

    fn refill(&mut self, now: Instant) {
        if now > self.last_refill {
            let elapsed = now.duration_since(self.last_refill).as_secs_f64();
            self.tokens = (self.tokens + elapsed * self.rps).min(self.capacity);
            self.last_refill = now;
        }
    }

    /// Take a token, returning how long the caller must wait for it
    ///
    /// When the bucket is dry the next token to accrue is booked for this
    /// caller: `last_refill` moves to the moment it will exist and the
    /// count stays at zero.
    pub fn reserve(&mut self, now: Instant) -> Duration {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Duration::ZERO;
        }

        let need = Duration::try_from_secs_f64((1.0 - self.tokens) / self.rps).unwrap_or(Duration::MAX);
        let wait = self.last_refill.saturating_duration_since(now).saturating_add(need);
        let booked_from = self.last_refill.max(now);
        self.last_refill = booked_from.checked_add(need).unwrap_or(booked_from);
        self.tokens = 0.0;
        wait
    }

    /// Take a token only if one is available now
    pub fn try_take(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// A [`RateLimit`] bound to its bucket
pub struct RateLimiter<C: Clock = SystemClock> {
    key: PolicyKey,
    bucket: Arc<Mutex<Bucket>>,
    clock: Arc<C>,
}

impl<C: Clock> Clone for RateLimiter<C> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            bucket: Arc::clone(&self.bucket),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<C: Clock> fmt::Debug for RateLimiter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("key", &self.key)
            .field("tokens", &self.bucket.lock().tokens)
            .finish()
    }
}

impl<C: Clock> RateLimiter<C> {
    pub const fn key(&self) -> &PolicyKey {
        &self.key
    }

    /// Book a token; the returned duration is how long to wait before using it
    pub fn reserve(&self) -> Duration {
        let now = self.clock.now();
        let wait = self.bucket.lock().reserve(now);
        if !wait.is_zero() {
            debug!(target: "resilient", key = %self.key, wait = ?wait, "rate limited, waiting for token");
        }
        wait
    }

    /// Wait cooperatively for a token
    pub async fn acquire(&self) {
        let wait = self.reserve();
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    /// Block the current thread until a token is available
    pub fn acquire_blocking(&self) {
        let wait = self.reserve();
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
    }

    pub fn try_acquire(&self) -> bool {
        let now = self.clock.now();
        self.bucket.lock().try_take(now)
    }

    /// Tokens available right now, after refill
    pub fn available_tokens(&self) -> f64 {
        let now = self.clock.now();
        let mut bucket = self.bucket.lock();
        bucket.refill(now);
        bucket.tokens
    }

    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Outcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<Failure>,
    {
        self.acquire().await;
        operation().await.map_err(Into::into)
    }

    pub fn call<F, T, E>(&self, operation: F) -> Outcome<T>
    where
        F: FnOnce() -> Result<T, E>,
        E: Into<Failure>,
    {
        self.acquire_blocking();
        operation().map_err(Into::into)
    }
}

impl<T: Send + 'static> Decorator<T> for RateLimit {
    fn decorate(&self, inner: AsyncOperation<T>) -> AsyncOperation<T> {
        let limiter = Arc::new(self.bind());
        Arc::new(move || {
            let limiter = Arc::clone(&limiter);
            let inner = Arc::clone(&inner);
            async move { limiter.execute(|| inner()).await }.boxed()
        })
    }

    fn decorate_blocking(&self, inner: BlockingOperation<T>) -> BlockingOperation<T> {
        let limiter = self.bind();
        Arc::new(move || limiter.call(|| inner()))
    }
}
