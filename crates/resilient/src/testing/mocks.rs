//! Scripted operations for driving policies in tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::result::{Failure, Outcome};

/// One scripted step
#[derive(Debug, Clone)]
pub enum Step<T> {
    Succeed(T),
    Fail(String),
    /// Sleep, then succeed; async callers only
    Delay(Duration, T),
}

/// An operation that replays a fixed script and counts invocations
///
/// Once the script runs out the last step repeats. Clones share the script
/// and the counter.
#[derive(Debug, Clone)]
pub struct ScriptedOperation<T> {
    steps: Arc<Mutex<VecDeque<Step<T>>>>,
    last: Arc<Mutex<Option<Step<T>>>>,
    calls: Arc<AtomicU32>,
}

impl<T: Clone + Send + 'static> ScriptedOperation<T> {
    pub fn new<I: IntoIterator<Item = Step<T>>>(steps: I) -> Self {
        Self {
            steps: Arc::new(Mutex::new(steps.into_iter().collect())),
            last: Arc::new(Mutex::new(None)),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Fail `failures` times with `message`, then succeed with `value`
    pub fn failing_then(failures: usize, message: &str, value: T) -> Self {
        let mut steps: Vec<Step<T>> = (0..failures).map(|_| Step::Fail(message.to_string())).collect();
        steps.push(Step::Succeed(value));
        Self::new(steps)
    }

    /// Always fail with `message`
    pub fn always_failing(message: &str) -> Self {
        Self::new([Step::Fail(message.to_string())])
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Option<Step<T>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.steps.lock().pop_front();
        let mut last = self.last.lock();
        if let Some(step) = next {
            *last = Some(step);
        }
        last.clone()
    }

    /// Run the next step on the current thread
    pub fn call(&self) -> Outcome<T> {
        match self.next_step() {
            Some(Step::Succeed(value) | Step::Delay(_, value)) => Ok(value),
            Some(Step::Fail(message)) => Err(Failure::value(message)),
            None => Err(Failure::value("empty script")),
        }
    }

    /// Run the next step asynchronously
    pub async fn run(&self) -> Outcome<T> {
        match self.next_step() {
            Some(Step::Succeed(value)) => Ok(value),
            Some(Step::Delay(delay, value)) => {
                tokio::time::sleep(delay).await;
                Ok(value)
            }
            Some(Step::Fail(message)) => Err(Failure::value(message)),
            None => Err(Failure::value("empty script")),
        }
    }
}
