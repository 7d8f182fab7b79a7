//! Resilience policies and their executors
//!
//! - **Backoff**: delay per retry attempt (fixed, linear, exponential) with
//!   optional jitter and a max clamp. Pure, available without the runtime.
//! - **Retry**: attempt budget, per-attempt deadline, handler, backoff.
//! - **Circuit**: keyed two-state breaker with a timed reset window.
//! - **RateLimit**: keyed token bucket; admission waits, never rejects.
//! - **Timeout**: deadline for one invocation.
//! - **Compose**: nests any of the above around an operation.
//!
//! Every policy has an async path (`execute`) and a blocking path (`call`).
//! Circuit and rate-limit state lives in process-wide keyed stores; see
//! [`store`].

pub mod backoff;

#[cfg(feature = "runtime")]
pub mod circuit_breaker;
#[cfg(feature = "runtime")]
pub mod clock;
#[cfg(feature = "runtime")]
pub mod compose;
#[cfg(feature = "runtime")]
pub mod rate_limiter;
#[cfg(feature = "runtime")]
pub mod retry;
#[cfg(feature = "runtime")]
pub mod store;
#[cfg(feature = "runtime")]
pub mod timeout;

pub use backoff::{Backoff, BackoffBuilder, BackoffStrategy, DEFAULT_MAX_DELAY};
#[cfg(feature = "runtime")]
pub use circuit_breaker::{Circuit, CircuitBreaker, CircuitBreakerMetrics, CircuitState};
#[cfg(feature = "runtime")]
pub use clock::{Clock, MockClock, SystemClock};
#[cfg(feature = "runtime")]
pub use compose::{
    blocking_operation, compose, compose_blocking, operation, AsyncOperation, BlockingOperation,
    Compose, Decorator,
};
#[cfg(feature = "runtime")]
pub use rate_limiter::{Bucket, RateLimit, RateLimiter};
#[cfg(feature = "runtime")]
pub use retry::{Handler, HandlerDecision, Retry, RetryExecutor};
#[cfg(feature = "runtime")]
pub use store::{KeyedStore, PolicyKey};
#[cfg(feature = "runtime")]
pub use timeout::Timeout;
