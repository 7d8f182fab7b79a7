//! Deadline for a single invocation
//!
//! The async path races the operation against the deadline and drops the
//! pending future when the deadline wins, so an abandoned attempt can never
//! touch shared state afterwards. The blocking path cannot preempt the
//! caller's thread: the work runs to completion and a late result is
//! discarded and reported as a timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tracing::debug;

use super::compose::{AsyncOperation, BlockingOperation, Decorator};
use crate::error::ResilienceError;
use crate::result::{Failure, Outcome};

/// Deadline policy for one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout {
    after: Duration,
}

impl Timeout {
    pub const fn new(after: Duration) -> Self {
        Self { after }
    }

    pub const fn after(&self) -> Duration {
        self.after
    }

    fn expired(&self) -> Failure {
        Failure::new(ResilienceError::Timeout { after: self.after })
    }

    /// Await `future` for at most the deadline
    pub async fn execute<Fut, T, E>(&self, future: Fut) -> Outcome<T>
    where
        Fut: Future<Output = Result<T, E>>,
        E: Into<Failure>,
    {
        match tokio::time::timeout(self.after, future).await {
            Ok(outcome) => outcome.map_err(Into::into),
            Err(_) => {
                debug!(target: "resilient", after = ?self.after, "attempt abandoned at deadline");
                Err(self.expired())
            }
        }
    }

    /// Run `operation` on the current thread, best-effort
    ///
    /// Errors raised before the deadline pass through unchanged.
    pub fn call<F, T, E>(&self, operation: F) -> Outcome<T>
    where
        F: FnOnce() -> Result<T, E>,
        E: Into<Failure>,
    {
        let started = Instant::now();
        let outcome = operation().map_err(Into::into);
        if started.elapsed() > self.after {
            debug!(target: "resilient", after = ?self.after, "late result discarded");
            return Err(self.expired());
        }
        outcome
    }
}

impl<T: Send + 'static> Decorator<T> for Timeout {
    fn decorate(&self, inner: AsyncOperation<T>) -> AsyncOperation<T> {
        let timeout = *self;
        Arc::new(move || {
            let pending = inner();
            async move { timeout.execute(pending).await }.boxed()
        })
    }

    fn decorate_blocking(&self, inner: BlockingOperation<T>) -> BlockingOperation<T> {
        let timeout = *self;
        Arc::new(move || timeout.call(|| inner()))
    }
}
