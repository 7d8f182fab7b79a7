//! Retry policy and executor
//!
//! The executor runs an operation up to `attempts` times. After each failure
//! it consults the optional [`Handler`], then either sleeps for the
//! [`Backoff`] delay and tries again or finishes with a failure. The
//! decision step is shared by the async ([`RetryExecutor::execute`]) and
//! blocking ([`RetryExecutor::call`]) paths; only the way they sleep differs.
//!
//! Events go to the `resilient` tracing target: one `DEBUG` event per retry
//! and one `INFO` event when an operation recovers after failing. Immediate
//! successes are silent.

use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, info, instrument};

use super::backoff::Backoff;
use super::compose::{AsyncOperation, BlockingOperation, Decorator};
use super::timeout::Timeout;
use crate::error::{ResilienceError, ResilienceResult};
use crate::result::{Failure, Outcome};

/// What to do after a failed attempt
#[derive(Debug, Clone)]
pub enum HandlerDecision {
    /// Retry per policy
    Continue,
    /// Stop now and surface the current error, even with attempts left
    Stop,
    /// Report this failure instead of the original and keep retrying
    Replace(Failure),
}

/// Callback consulted after every failed attempt
pub trait Handler: Send + Sync {
    fn handle(&self, failure: &Failure) -> HandlerDecision;
}

impl<F> Handler for F
where
    F: Fn(&Failure) -> HandlerDecision + Send + Sync,
{
    fn handle(&self, failure: &Failure) -> HandlerDecision {
        self(failure)
    }
}

/// Retry policy
///
/// Immutable once built and cheap to clone; every clone shares the handler.
#[derive(Clone)]
pub struct Retry {
    attempts: u32,
    timeout: Option<Duration>,
    backoff: Backoff,
    handler: Option<Arc<dyn Handler>>,
}

impl fmt::Debug for Retry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retry")
            .field("attempts", &self.attempts)
            .field("timeout", &self.timeout)
            .field("backoff", &self.backoff)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

impl Default for Retry {
    fn default() -> Self {
        Self { attempts: 3, timeout: None, backoff: Backoff::default(), handler: None }
    }
}

impl Retry {
    /// Policy allowing `attempts` invocations in total
    ///
    /// # Errors
    ///
    /// Returns [`ResilienceError::InvalidConfiguration`] when `attempts` is 0.
    pub fn new(attempts: u32) -> ResilienceResult<Self> {
        if attempts == 0 {
            return Err(ResilienceError::invalid("attempts must be at least 1"));
        }
        Ok(Self { attempts, ..Self::default() })
    }

    fn preset(attempts: u32, timeout_secs: u64) -> Self {
        Self { attempts, timeout: Some(Duration::from_secs(timeout_secs)), ..Self::default() }
    }

    /// External HTTP APIs: 3 attempts, 30s per attempt
    pub fn api() -> Self {
        Self::preset(3, 30)
    }

    /// Databases: 5 attempts, 60s per attempt
    pub fn db() -> Self {
        Self::preset(5, 60)
    }

    /// Model inference: 2 attempts, 120s per attempt
    pub fn ml() -> Self {
        Self::preset(2, 120)
    }

    /// Bound every attempt by `timeout`
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Drop the per-attempt deadline
    #[must_use]
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_handler<H: Handler + 'static>(mut self, handler: H) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    #[must_use]
    pub fn with_shared_handler(mut self, handler: Arc<dyn Handler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub const fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub fn handler(&self) -> Option<&Arc<dyn Handler>> {
        self.handler.as_ref()
    }
}

/// Outcome of one failed attempt
#[derive(Debug)]
enum Step {
    Sleep(Duration),
    Finish(Failure),
}

/// Runs operations under a [`Retry`] policy
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: Retry,
    name: Cow<'static, str>,
}

impl RetryExecutor {
    pub fn new(policy: Retry) -> Self {
        Self::named(policy, "operation")
    }

    /// Executor whose events name the operation
    pub fn named<S: Into<Cow<'static, str>>>(policy: Retry, name: S) -> Self {
        Self { policy, name: name.into() }
    }

    pub const fn policy(&self) -> &Retry {
        &self.policy
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn next_step(&self, attempt: u32, failure: Failure) -> Step {
        let failure = match self.policy.handler.as_deref().map(|h| h.handle(&failure)) {
            Some(HandlerDecision::Stop) => return Step::Finish(failure),
            Some(HandlerDecision::Replace(replacement)) => replacement,
            Some(HandlerDecision::Continue) | None => failure,
        };

        let attempts = self.policy.attempts;
        if attempt >= attempts {
            debug!(
                target: "resilient",
                operation = %self.name,
                attempts,
                error_class = failure.class_name(),
                "retries exhausted"
            );
            return Step::Finish(failure);
        }

        let delay = self.policy.backoff.calculate(attempt - 1);
        debug!(
            target: "resilient",
            operation = %self.name,
            attempt = attempt + 1,
            attempts,
            error_class = failure.class_name(),
            delay_secs = delay.as_secs_f64(),
            "Retrying {} (attempt {}/{}) after {}: waiting {:?}s",
            self.name,
            attempt + 1,
            attempts,
            failure.class_name(),
            delay.as_secs_f64(),
        );
        Step::Sleep(delay)
    }

    fn report_recovery(&self, attempt: u32) {
        if attempt > 1 {
            info!(
                target: "resilient",
                operation = %self.name,
                attempts = attempt,
                "{} succeeded after {} attempts",
                self.name,
                attempt,
            );
        }
    }

    /// Run `operation` until it succeeds or the policy gives up
    ///
    /// Sleeps between attempts without blocking the runtime.
    #[instrument(
        level = "debug",
        skip(self, operation),
        fields(operation = %self.name, attempts = self.policy.attempts)
    )]
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Outcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<Failure>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = match self.policy.timeout {
                Some(after) => Timeout::new(after).execute(operation()).await,
                None => operation().await.map_err(Into::into),
            };
            match outcome {
                Ok(value) => {
                    self.report_recovery(attempt);
                    return Ok(value);
                }
                Err(failure) => match self.next_step(attempt, failure) {
                    Step::Sleep(delay) => tokio::time::sleep(delay).await,
                    Step::Finish(failure) => return Err(failure),
                },
            }
        }
    }

    /// Blocking counterpart of [`RetryExecutor::execute`]
    ///
    /// Sleeps the calling thread between attempts.
    #[instrument(
        level = "debug",
        skip(self, operation),
        fields(operation = %self.name, attempts = self.policy.attempts)
    )]
    pub fn call<F, T, E>(&self, mut operation: F) -> Outcome<T>
    where
        F: FnMut() -> Result<T, E>,
        E: Into<Failure>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = match self.policy.timeout {
                Some(after) => Timeout::new(after).call(&mut operation),
                None => operation().map_err(Into::into),
            };
            match outcome {
                Ok(value) => {
                    self.report_recovery(attempt);
                    return Ok(value);
                }
                Err(failure) => match self.next_step(attempt, failure) {
                    Step::Sleep(delay) => std::thread::sleep(delay),
                    Step::Finish(failure) => return Err(failure),
                },
            }
        }
    }
}

impl<T: Send + 'static> Decorator<T> for Retry {
    fn decorate(&self, inner: AsyncOperation<T>) -> AsyncOperation<T> {
        let executor = Arc::new(RetryExecutor::new(self.clone()));
        Arc::new(move || {
            let executor = Arc::clone(&executor);
            let inner = Arc::clone(&inner);
            async move { executor.execute(|| inner()).await }.boxed()
        })
    }

    fn decorate_blocking(&self, inner: BlockingOperation<T>) -> BlockingOperation<T> {
        let executor = RetryExecutor::new(self.clone());
        Arc::new(move || executor.call(|| inner()))
    }
}
