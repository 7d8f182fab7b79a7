//! One entry point for wrapping an operation
//!
//! [`Resilient`] gathers retry, backoff, deadline, handler, error typing,
//! circuit breaking and rate limiting into a single builder. Decorating an
//! operation binds the stateful policies and yields a [`ResilientFn`]:
//!
//! ```text
//! Retry( RateLimit -> Circuit -> Timeout -> operation )
//! ```
//!
//! Each attempt waits for a token, passes the circuit's admission check and
//! runs under the deadline. Failed attempts, including timeouts and circuit
//! rejections, go back to the retry loop. A configured [`ErrorType`] rewraps
//! the final failure.
//!
//! The bare form [`resilient`] and the parameterized form
//! `Resilient::new()...decorate(op)` share one constructor.

pub mod handlers;
pub mod registry;

use std::any::type_name;
use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;

use crate::error::{ErrorType, ResilienceResult, TypedError};
use crate::resilience::{
    AsyncOperation, Backoff, BlockingOperation, Circuit, CircuitBreaker, Decorator, Handler,
    RateLimit, RateLimiter, Retry, RetryExecutor, Timeout,
};
use crate::result::{Failure, Flatten, Outcome};

pub use handlers::{fallback, stop_on_circuit_open};
pub use registry::{preset, presets, PresetBuilder, PresetRegistry};

/// Builder for a resilient operation
#[derive(Clone, Default)]
pub struct Resilient {
    retry: Retry,
    attempts: Option<u32>,
    timeout: Option<Duration>,
    error_type: Option<ErrorType>,
    circuit: Option<Circuit>,
    rate_limit: Option<RateLimit>,
    key: Option<Arc<str>>,
    name: Option<Cow<'static, str>>,
}

impl fmt::Debug for Resilient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resilient")
            .field("retry", &self.retry)
            .field("attempts", &self.attempts)
            .field("timeout", &self.timeout)
            .field("error_type", &self.error_type)
            .field("circuit", &self.circuit)
            .field("rate_limit", &self.rate_limit)
            .field("key", &self.key)
            .field("name", &self.name)
            .finish()
    }
}

impl Resilient {
    /// Defaults: 3 attempts, exponential backoff, no deadline
    pub fn new() -> Self {
        Self::default()
    }

    /// Total invocations allowed, validated at decoration
    #[must_use]
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    /// Deadline for each attempt
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Start from a pre-built retry policy
    ///
    /// Later `attempts`, `timeout`, `backoff` and `handler` calls refine it.
    #[must_use]
    pub fn retry(mut self, retry: Retry) -> Self {
        self.timeout = retry.timeout().or(self.timeout);
        self.retry = retry.without_timeout();
        self
    }

    #[must_use]
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.retry = self.retry.with_backoff(backoff);
        self
    }

    /// Consult `handler` after every failed attempt
    #[must_use]
    pub fn handler<H: Handler + 'static>(mut self, handler: H) -> Self {
        self.retry = self.retry.with_handler(handler);
        self
    }

    /// Retry only while `switch` reports it changed mode
    #[must_use]
    pub fn fallback<S>(self, switch: S) -> Self
    where
        S: Fn() -> bool + Send + Sync + 'static,
    {
        self.handler(fallback(switch))
    }

    /// Rewrap the final failure under `error_type`
    #[must_use]
    pub fn error_type(mut self, error_type: ErrorType) -> Self {
        self.error_type = Some(error_type);
        self
    }

    #[must_use]
    pub fn circuit(mut self, circuit: Circuit) -> Self {
        self.circuit = Some(circuit);
        self
    }

    #[must_use]
    pub fn rate_limit(mut self, rate_limit: RateLimit) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }

    /// Shared state key for the circuit and rate limit
    ///
    /// Policies that already carry their own key keep it.
    #[must_use]
    pub fn key<S: AsRef<str>>(mut self, key: S) -> Self {
        self.key = Some(Arc::from(key.as_ref()));
        self
    }

    /// Operation name used in retry and recovery events
    #[must_use]
    pub fn name<S: Into<Cow<'static, str>>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    fn keyed<P: Clone>(
        &self,
        policy: Option<&P>,
        key_of: fn(&P) -> Option<&str>,
        rekey: fn(P, &str) -> P,
    ) -> Option<P> {
        let policy = policy.cloned()?;
        let has_own_key = key_of(&policy).is_some();
        match &self.key {
            Some(key) if !has_own_key => Some(rekey(policy, key)),
            _ => Some(policy),
        }
    }

    fn chain(&self, name: Cow<'static, str>) -> ResilienceResult<Chain> {
        let mut retry = self.retry.clone();
        if let Some(attempts) = self.attempts {
            let base = Retry::new(attempts)?.with_backoff(retry.backoff().clone());
            retry = match retry.handler() {
                Some(handler) => base.with_shared_handler(Arc::clone(handler)),
                None => base,
            };
        }

        let circuit = self.keyed(self.circuit.as_ref(), Circuit::key, |c, k| c.with_key(k));
        let rate_limit = self.keyed(self.rate_limit.as_ref(), RateLimit::key, |r, k| r.with_key(k));

        Ok(Chain {
            executor: RetryExecutor::named(retry, name),
            limiter: rate_limit.map(|policy| policy.bind()),
            breaker: circuit.map(|policy| policy.bind()),
            timeout: self.timeout.map(Timeout::new),
            error_type: self.error_type.clone(),
        })
    }

    /// Wrap `operation`, binding its circuit and rate limit
    ///
    /// Without a key each decorated operation gets its own circuit and
    /// bucket.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ResilienceError::InvalidConfiguration`] for a zero
    /// attempt budget.
    pub fn decorate<F>(&self, operation: F) -> ResilienceResult<ResilientFn<F>> {
        let name = self.name.clone().unwrap_or_else(|| Cow::Borrowed(operation_name::<F>()));
        Ok(ResilientFn::new(operation, self.chain(name)?))
    }
}

/// Wrap `operation` with the default policy
///
/// Equivalent to `Resilient::new().decorate(operation)`, which cannot fail.
pub fn resilient<F>(operation: F) -> ResilientFn<F> {
    ResilientFn::new(operation, Chain::plain(operation_name::<F>()))
}

/// Function items name themselves; closures fall back to "operation"
fn operation_name<F>() -> &'static str {
    let full = type_name::<F>();
    if full.contains('{') || full.contains('<') || full.contains('(') {
        return "operation";
    }
    full.rsplit("::").next().unwrap_or("operation")
}

struct Chain {
    executor: RetryExecutor,
    limiter: Option<RateLimiter>,
    breaker: Option<CircuitBreaker>,
    timeout: Option<Timeout>,
    error_type: Option<ErrorType>,
}

impl Chain {
    fn plain(name: &'static str) -> Self {
        Self {
            executor: RetryExecutor::named(Retry::default(), name),
            limiter: None,
            breaker: None,
            timeout: None,
            error_type: None,
        }
    }

    async fn attempt<Op, Fut, T, E>(&self, operation: &Op) -> Outcome<T>
    where
        Op: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<Failure>,
    {
        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }
        if let Some(breaker) = &self.breaker {
            breaker.admit()?;
        }
        let outcome = match self.timeout {
            Some(timeout) => timeout.execute(operation()).await,
            None => operation().await.map_err(Into::into),
        };
        self.record(&outcome);
        outcome
    }

    fn attempt_blocking<Op, T, E>(&self, operation: &Op) -> Outcome<T>
    where
        Op: Fn() -> Result<T, E>,
        E: Into<Failure>,
    {
        if let Some(limiter) = &self.limiter {
            limiter.acquire_blocking();
        }
        if let Some(breaker) = &self.breaker {
            breaker.admit()?;
        }
        let outcome = match self.timeout {
            Some(timeout) => timeout.call(operation),
            None => operation().map_err(Into::into),
        };
        self.record(&outcome);
        outcome
    }

    fn record<T>(&self, outcome: &Outcome<T>) {
        if let Some(breaker) = &self.breaker {
            if outcome.is_err() {
                breaker.record_failure();
            } else {
                breaker.record_success();
            }
        }
    }

    async fn run<Op, Fut, T, E>(&self, operation: &Op) -> Outcome<T>
    where
        Op: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<Failure>,
    {
        let outcome = self.executor.execute(move || self.attempt(operation)).await;
        self.finish(outcome)
    }

    fn run_blocking<Op, T, E>(&self, operation: &Op) -> Outcome<T>
    where
        Op: Fn() -> Result<T, E>,
        E: Into<Failure>,
    {
        let outcome = self.executor.call(|| self.attempt_blocking(operation));
        self.finish(outcome)
    }

    fn finish<T>(&self, outcome: Outcome<T>) -> Outcome<T> {
        match (&self.error_type, outcome) {
            (Some(error_type), Err(failure)) => {
                Err(Failure::new(TypedError::new(error_type.clone(), failure)))
            }
            (_, outcome) => outcome,
        }
    }
}

/// A decorated operation
///
/// Cloning shares the bound circuit and bucket.
pub struct ResilientFn<F> {
    operation: F,
    chain: Arc<Chain>,
}

impl<F: Clone> Clone for ResilientFn<F> {
    fn clone(&self) -> Self {
        Self { operation: self.operation.clone(), chain: Arc::clone(&self.chain) }
    }
}

impl<F> fmt::Debug for ResilientFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientFn")
            .field("name", &self.chain.executor.name())
            .field("attempts", &self.chain.executor.policy().attempts())
            .field("timeout", &self.chain.timeout)
            .field("error_type", &self.chain.error_type)
            .finish()
    }
}

impl<F> ResilientFn<F> {
    fn new(operation: F, chain: Chain) -> Self {
        Self { operation, chain: Arc::new(chain) }
    }

    pub fn name(&self) -> &str {
        self.chain.executor.name()
    }

    /// The bound circuit breaker, if one was configured
    pub fn breaker(&self) -> Option<&CircuitBreaker> {
        self.chain.breaker.as_ref()
    }

    /// The bound rate limiter, if one was configured
    pub fn limiter(&self) -> Option<&RateLimiter> {
        self.chain.limiter.as_ref()
    }

    /// Run an async operation
    pub async fn run<Fut, T, E>(&self) -> Outcome<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<Failure>,
    {
        self.chain.run(&self.operation).await
    }

    /// Run an async operation that takes an argument
    ///
    /// Every attempt receives a clone of `arg`.
    pub async fn run_with<A, Fut, T, E>(&self, arg: A) -> Outcome<T>
    where
        F: Fn(A) -> Fut,
        A: Clone,
        Fut: Future<Output = Result<T, E>>,
        E: Into<Failure>,
    {
        let operation = || (self.operation)(arg.clone());
        self.chain.run(&operation).await
    }

    /// Run a blocking operation
    pub fn call<T, E>(&self) -> Outcome<T>
    where
        F: Fn() -> Result<T, E>,
        E: Into<Failure>,
    {
        self.chain.run_blocking(&self.operation)
    }

    /// Run a blocking operation that takes an argument
    pub fn call_with<A, T, E>(&self, arg: A) -> Outcome<T>
    where
        F: Fn(A) -> Result<T, E>,
        A: Clone,
        E: Into<Failure>,
    {
        let operation = || (self.operation)(arg.clone());
        self.chain.run_blocking(&operation)
    }

    /// Run an async operation whose success value is itself a result
    ///
    /// One level of nesting is collapsed before the retry decision, so an
    /// `Ok(Err(e))` counts as a failed attempt.
    pub async fn run_flat<Fut, T, E, N>(&self) -> Outcome<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Result<T, N>, E>>,
        E: Into<Failure>,
        N: Into<Failure>,
    {
        let operation = || {
            let pending = (self.operation)();
            async move { pending.await.flatten_nested() }
        };
        self.chain.run(&operation).await
    }

    /// Blocking form of [`ResilientFn::run_flat`]
    pub fn call_flat<T, E, N>(&self) -> Outcome<T>
    where
        F: Fn() -> Result<Result<T, N>, E>,
        E: Into<Failure>,
        N: Into<Failure>,
    {
        let operation = || (self.operation)().flatten_nested();
        self.chain.run_blocking(&operation)
    }
}

impl<T: Send + 'static> Decorator<T> for Resilient {
    fn decorate(&self, inner: AsyncOperation<T>) -> AsyncOperation<T> {
        let operation = move || inner();
        let decorated = match Resilient::decorate(self, operation) {
            Ok(decorated) => Arc::new(decorated),
            Err(error) => {
                let failure = Failure::new(error);
                return Arc::new(move || futures::future::ready(Err(failure.clone())).boxed());
            }
        };
        Arc::new(move || {
            let decorated = Arc::clone(&decorated);
            async move { decorated.run().await }.boxed()
        })
    }

    fn decorate_blocking(&self, inner: BlockingOperation<T>) -> BlockingOperation<T> {
        let operation = move || inner();
        match Resilient::decorate(self, operation) {
            Ok(decorated) => Arc::new(move || decorated.call()),
            Err(error) => {
                let failure = Failure::new(error);
                Arc::new(move || Err(failure.clone()))
            }
        }
    }
}
