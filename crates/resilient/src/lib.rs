//! Resilience decorators for fallible operations.
//!
//! Wrap a synchronous or asynchronous operation with retry and backoff,
//! circuit breaking, token-bucket rate limiting and per-attempt deadlines.
//! Every outcome is an [`Outcome`], a `Result` whose error side is the
//! type-erased [`Failure`].
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use resilient::{Circuit, Failure, Resilient};
//!
//! # async fn fetch() -> Result<String, Failure> { Ok(String::new()) }
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let fetch = Resilient::new()
//!     .attempts(3)
//!     .timeout(Duration::from_secs(2))
//!     .circuit(Circuit::fast())
//!     .decorate(fetch)?;
//!
//! let body = fetch.run().await;
//! # let _ = body;
//! # Ok(())
//! # }
//! ```
//!
//! # Feature Tiers
//!
//! - `foundation`: result algebra, errors, backoff, settings helpers
//! - `runtime`: policies, executors, keyed state, facade, presets and
//!   settings loading (default)
//! - `test-utils`: temporary settings files on top of `runtime`
//!
//! Events go to the `resilient` tracing target. The crate installs no
//! subscriber, so nothing is emitted unless the application sets one up.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
#[macro_use]
pub mod utils;
#[cfg(feature = "foundation")]
pub mod error;
#[cfg(feature = "foundation")]
pub mod resilience;
#[cfg(feature = "foundation")]
pub mod result;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod config;
#[cfg(feature = "runtime")]
pub mod facade;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod testing;

// Re-exports
// ------------------------
#[cfg(feature = "runtime")]
pub use config::ResilienceSettings;
#[cfg(feature = "foundation")]
pub use error::{ErrorType, ResilienceError, ResilienceResult, TypedError};
#[cfg(feature = "runtime")]
pub use facade::{preset, presets, resilient, PresetRegistry, Resilient, ResilientFn};
#[cfg(feature = "foundation")]
pub use resilience::{Backoff, BackoffStrategy};
#[cfg(feature = "runtime")]
pub use resilience::{
    compose, compose_blocking, Circuit, CircuitBreaker, CircuitState, Clock, Compose, Decorator,
    HandlerDecision, MockClock, RateLimit, RateLimiter, Retry, RetryExecutor, SystemClock, Timeout,
};
#[cfg(feature = "foundation")]
pub use result::{collect, Failure, Flatten, Outcome, ResultExt, SharedError};
#[cfg(feature = "foundation")]
pub use utils::serde::{duration_secs, option_duration_secs};
