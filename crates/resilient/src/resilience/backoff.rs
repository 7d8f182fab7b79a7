//! Delay schedules between retry attempts
//!
//! [`Backoff::calculate`] is a pure function of the attempt index:
//!
//! | strategy      | delay before retry `i + 1`   |
//! |---------------|------------------------------|
//! | `fixed`       | `delay`                      |
//! | `linear`      | `delay * (i + 1)`            |
//! | `exponential` | `delay * factor^i`           |
//!
//! The result is clamped to `max_delay`, then, with jitter on, scaled by a
//! uniform factor in `[0.5, 1.0)`.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ResilienceError, ResilienceResult};

/// Default upper bound for any computed delay
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Growth strategy of a [`Backoff`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// Same delay every time
    Fixed,
    /// Delay grows by `delay` each attempt
    Linear,
    /// Delay multiplies by `factor` each attempt
    Exponential,
}

crate::impl_name_conversions!(BackoffStrategy {
    Fixed => "fixed",
    Linear => "linear",
    Exponential => "exponential",
});

/// Delay schedule between retry attempts
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    strategy: BackoffStrategy,
    delay: Duration,
    factor: f64,
    max_delay: Duration,
    jitter: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            delay: Duration::from_secs(1),
            factor: 2.0,
            max_delay: DEFAULT_MAX_DELAY,
            jitter: true,
        }
    }
}

impl Backoff {
    /// Constant delay; the cap is raised to `delay` when it exceeds the default
    pub fn fixed(delay: Duration) -> Self {
        Self {
            strategy: BackoffStrategy::Fixed,
            delay,
            factor: 1.0,
            max_delay: delay.max(DEFAULT_MAX_DELAY),
            jitter: true,
        }
    }

    /// Linearly growing delay
    pub fn linear(delay: Duration) -> Self {
        Self { strategy: BackoffStrategy::Linear, delay, factor: 1.0, ..Self::default() }
    }

    /// Exponentially growing delay
    ///
    /// # Errors
    ///
    /// Returns [`ResilienceError::InvalidConfiguration`] when `factor` is not
    /// a finite number greater than zero.
    pub fn exponential(delay: Duration, factor: f64) -> ResilienceResult<Self> {
        Self::builder().delay(delay).factor(factor).build()
    }

    /// Start from the default exponential schedule
    pub fn builder() -> BackoffBuilder {
        BackoffBuilder::new()
    }

    /// Replace the cap
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Enable or disable jitter
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Disable jitter
    #[must_use]
    pub fn without_jitter(self) -> Self {
        self.with_jitter(false)
    }

    pub const fn strategy(&self) -> BackoffStrategy {
        self.strategy
    }

    pub const fn delay(&self) -> Duration {
        self.delay
    }

    pub const fn factor(&self) -> f64 {
        self.factor
    }

    pub const fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub const fn jitter(&self) -> bool {
        self.jitter
    }

    /// Delay before retry number `attempt + 1` (0-based)
    pub fn calculate(&self, attempt: u32) -> Duration {
        let cap = self.max_delay.as_secs_f64();
        let base = self.delay.as_secs_f64();
        let raw = match self.strategy {
            BackoffStrategy::Fixed => base,
            BackoffStrategy::Linear => base * (f64::from(attempt) + 1.0),
            BackoffStrategy::Exponential => {
                base * self.factor.powi(i32::try_from(attempt).unwrap_or(i32::MAX))
            }
        };
        // powi overflows to infinity for large attempts; the cap absorbs it.
        let mut seconds = if raw.is_nan() { cap } else { raw.min(cap) };
        if self.jitter {
            seconds *= rand::thread_rng().gen_range(0.5..1.0);
        }
        Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or(self.max_delay)
    }
}

/// Builder for [`Backoff`]
#[derive(Debug)]
pub struct BackoffBuilder {
    backoff: Backoff,
    max_delay: Option<Duration>,
}

impl Default for BackoffBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BackoffBuilder {
    pub fn new() -> Self {
        Self { backoff: Backoff::default(), max_delay: None }
    }

    pub fn strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff.strategy = strategy;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.backoff.delay = delay;
        self
    }

    pub fn factor(mut self, factor: f64) -> Self {
        self.backoff.factor = factor;
        self
    }

    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn jitter(mut self, jitter: bool) -> Self {
        self.backoff.jitter = jitter;
        self
    }

    pub fn build(self) -> ResilienceResult<Backoff> {
        if !self.backoff.factor.is_finite() || self.backoff.factor <= 0.0 {
            return Err(ResilienceError::invalid("backoff factor must be a positive number"));
        }
        let mut backoff = self.backoff;
        backoff.max_delay = match (self.max_delay, backoff.strategy) {
            (Some(max_delay), _) => max_delay,
            // Same rule as `Backoff::fixed`
            (None, BackoffStrategy::Fixed) => backoff.delay.max(DEFAULT_MAX_DELAY),
            (None, _) => DEFAULT_MAX_DELAY,
        };
        Ok(backoff)
    }
}
