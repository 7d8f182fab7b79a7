//! Resilience settings loaded from files and the environment
//!
//! ## Sources
//! 1. TOML or JSON text ([`ResilienceSettings::from_toml_str`],
//!    [`ResilienceSettings::from_json_str`])
//! 2. A file; the format follows the extension (`.json`, otherwise TOML)
//! 3. `RESILIENT_*` environment variables layered on top
//!
//! ## Environment Variables
//! - `RESILIENT_ATTEMPTS`: total attempts
//! - `RESILIENT_TIMEOUT`: per-attempt deadline in seconds
//! - `RESILIENT_BACKOFF_STRATEGY`: `fixed`, `linear` or `exponential`
//! - `RESILIENT_BACKOFF_DELAY`, `RESILIENT_BACKOFF_MAX_DELAY`: seconds
//! - `RESILIENT_BACKOFF_FACTOR`: exponential growth factor
//! - `RESILIENT_BACKOFF_JITTER`: `true`/`false`
//! - `RESILIENT_CIRCUIT_FAILURES`, `RESILIENT_CIRCUIT_WINDOW` (seconds)
//! - `RESILIENT_RATE_LIMIT_RPS`, `RESILIENT_RATE_LIMIT_BURST`
//! - `RESILIENT_ERROR_TYPE`, `RESILIENT_KEY`, `RESILIENT_NAME`
//!
//! Durations are seconds and may be fractional.
//!
//! ```toml
//! error_type = "network"
//!
//! [retry]
//! attempts = 4
//! timeout = 2.5
//!
//! [backoff]
//! strategy = "linear"
//! delay = 0.5
//!
//! [circuit]
//! failures = 3
//! window = 60
//! ```

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ErrorType, ResilienceError, ResilienceResult};
use crate::facade::Resilient;
use crate::resilience::{Backoff, BackoffStrategy, Circuit, RateLimit, Retry};
use crate::utils::serde::{duration_secs, option_duration_secs};

const ENV_PREFIX: &str = "RESILIENT_";

/// Complete settings for one resilient operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceSettings {
    pub retry: RetrySettings,
    pub backoff: BackoffSettings,
    pub circuit: Option<CircuitSettings>,
    pub rate_limit: Option<RateLimitSettings>,
    pub error_type: Option<String>,
    pub key: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub attempts: u32,
    #[serde(with = "option_duration_secs")]
    pub timeout: Option<Duration>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { attempts: Retry::default().attempts(), timeout: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffSettings {
    pub strategy: BackoffStrategy,
    #[serde(with = "duration_secs")]
    pub delay: Duration,
    pub factor: f64,
    /// Unset keeps the strategy's own cap
    #[serde(with = "option_duration_secs", skip_serializing_if = "Option::is_none")]
    pub max_delay: Option<Duration>,
    pub jitter: bool,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        let backoff = Backoff::default();
        Self {
            strategy: backoff.strategy(),
            delay: backoff.delay(),
            factor: backoff.factor(),
            max_delay: None,
            jitter: backoff.jitter(),
        }
    }
}

impl BackoffSettings {
    /// # Errors
    ///
    /// Returns [`ResilienceError::InvalidConfiguration`] for a bad factor.
    pub fn to_backoff(&self) -> ResilienceResult<Backoff> {
        let mut builder = Backoff::builder()
            .strategy(self.strategy)
            .delay(self.delay)
            .factor(self.factor)
            .jitter(self.jitter);
        if let Some(max_delay) = self.max_delay {
            builder = builder.max_delay(max_delay);
        }
        builder.build()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitSettings {
    pub failures: u32,
    #[serde(with = "duration_secs")]
    pub window: Duration,
}

impl Default for CircuitSettings {
    fn default() -> Self {
        let circuit = Circuit::default();
        Self { failures: circuit.failures(), window: circuit.window() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub rps: f64,
    pub burst: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        let limit = RateLimit::default();
        Self { rps: limit.rps(), burst: limit.burst() }
    }
}

impl ResilienceSettings {
    /// Parse and validate TOML text
    ///
    /// # Errors
    ///
    /// Returns [`ResilienceError::Config`] for malformed text and
    /// [`ResilienceError::InvalidConfiguration`] for out-of-range values.
    pub fn from_toml_str(contents: &str) -> ResilienceResult<Self> {
        let settings: Self = toml::from_str(contents)
            .map_err(|e| ResilienceError::config(format!("Invalid TOML format: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse and validate JSON text
    ///
    /// # Errors
    ///
    /// Same as [`ResilienceSettings::from_toml_str`].
    pub fn from_json_str(contents: &str) -> ResilienceResult<Self> {
        let settings: Self = serde_json::from_str(contents)
            .map_err(|e| ResilienceError::config(format!("Invalid JSON format: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load a settings file
    ///
    /// `.json` files are read as JSON, everything else as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ResilienceError::Config`] when the file is missing,
    /// unreadable or malformed.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> ResilienceResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ResilienceError::config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        info!(target: "resilient", path = %path.display(), "Loading resilience settings from file");
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ResilienceError::config(format!("Failed to read config file: {e}")))?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&contents),
            _ => Self::from_toml_str(&contents),
        }
    }

    /// Layer `RESILIENT_*` variables from the process environment
    ///
    /// # Errors
    ///
    /// Returns [`ResilienceError::Config`] naming the variable that failed to
    /// parse.
    pub fn apply_env_overrides(&mut self) -> ResilienceResult<()> {
        self.apply_overrides(std::env::vars())
    }

    /// Layer `RESILIENT_*` entries from any key/value source
    ///
    /// Unrelated keys are ignored.
    ///
    /// # Errors
    ///
    /// Same as [`ResilienceSettings::apply_env_overrides`].
    pub fn apply_overrides<I, K, V>(&mut self, vars: I) -> ResilienceResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let (key, value) = (key.as_ref(), value.as_ref());
            let Some(field) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            self.apply_one(key, field, value)?;
            debug!(target: "resilient", variable = key, "applied settings override");
        }
        self.validate()
    }

    fn apply_one(&mut self, key: &str, field: &str, value: &str) -> ResilienceResult<()> {
        match field {
            "ATTEMPTS" => self.retry.attempts = parse(key, value)?,
            "TIMEOUT" => self.retry.timeout = Some(parse_secs(key, value)?),
            "BACKOFF_STRATEGY" => {
                self.backoff.strategy = BackoffStrategy::from_str(value)
                    .map_err(|e| ResilienceError::config(format!("Invalid {key}: {e}")))?;
            }
            "BACKOFF_DELAY" => self.backoff.delay = parse_secs(key, value)?,
            "BACKOFF_FACTOR" => self.backoff.factor = parse(key, value)?,
            "BACKOFF_MAX_DELAY" => self.backoff.max_delay = Some(parse_secs(key, value)?),
            "BACKOFF_JITTER" => self.backoff.jitter = parse(key, value)?,
            "CIRCUIT_FAILURES" => {
                self.circuit.get_or_insert_with(CircuitSettings::default).failures = parse(key, value)?;
            }
            "CIRCUIT_WINDOW" => {
                self.circuit.get_or_insert_with(CircuitSettings::default).window = parse_secs(key, value)?;
            }
            "RATE_LIMIT_RPS" => {
                self.rate_limit.get_or_insert_with(RateLimitSettings::default).rps = parse(key, value)?;
            }
            "RATE_LIMIT_BURST" => {
                self.rate_limit.get_or_insert_with(RateLimitSettings::default).burst = parse(key, value)?;
            }
            "ERROR_TYPE" => self.error_type = Some(value.to_string()),
            "KEY" => self.key = Some(value.to_string()),
            "NAME" => self.name = Some(value.to_string()),
            _ => debug!(target: "resilient", variable = key, "ignoring unknown settings variable"),
        }
        Ok(())
    }

    /// Check every section builds a valid policy
    ///
    /// # Errors
    ///
    /// Returns [`ResilienceError::InvalidConfiguration`] for the first bad
    /// value.
    pub fn validate(&self) -> ResilienceResult<()> {
        Retry::new(self.retry.attempts)?;
        self.backoff.to_backoff()?;
        if let Some(circuit) = &self.circuit {
            Circuit::new(circuit.failures, circuit.window)?;
        }
        if let Some(limit) = &self.rate_limit {
            RateLimit::new(limit.rps, limit.burst)?;
        }
        Ok(())
    }

    /// Build the [`Resilient`] these settings describe
    ///
    /// # Errors
    ///
    /// Returns [`ResilienceError::InvalidConfiguration`] for out-of-range
    /// values.
    pub fn to_resilient(&self) -> ResilienceResult<Resilient> {
        let mut retry = Retry::new(self.retry.attempts)?.with_backoff(self.backoff.to_backoff()?);
        if let Some(timeout) = self.retry.timeout {
            retry = retry.with_timeout(timeout);
        }

        let mut resilient = Resilient::new().retry(retry);
        if let Some(circuit) = &self.circuit {
            resilient = resilient.circuit(Circuit::new(circuit.failures, circuit.window)?);
        }
        if let Some(limit) = &self.rate_limit {
            resilient = resilient.rate_limit(RateLimit::new(limit.rps, limit.burst)?);
        }
        if let Some(error_type) = &self.error_type {
            resilient = resilient.error_type(ErrorType::new(error_type.clone()));
        }
        if let Some(key) = &self.key {
            resilient = resilient.key(key);
        }
        if let Some(name) = &self.name {
            resilient = resilient.name(name.clone());
        }
        Ok(resilient)
    }
}

fn parse<T>(key: &str, value: &str) -> ResilienceResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ResilienceError::config(format!("Invalid {key}: {e}")))
}

fn parse_secs(key: &str, value: &str) -> ResilienceResult<Duration> {
    let secs: f64 = parse(key, value)?;
    Duration::try_from_secs_f64(secs)
        .map_err(|e| ResilienceError::config(format!("Invalid {key}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_policies() {
        let settings = ResilienceSettings::default();
        assert_eq!(settings.retry.attempts, 3);
        assert_eq!(settings.backoff.to_backoff().ok(), Some(Backoff::default()));
        assert!(settings.circuit.is_none());
    }

    #[test]
    fn test_overrides_layer_on_top() {
        let mut settings = ResilienceSettings::default();
        settings
            .apply_overrides([
                ("RESILIENT_ATTEMPTS", "5"),
                ("RESILIENT_BACKOFF_STRATEGY", "Fixed"),
                ("RESILIENT_CIRCUIT_WINDOW", "12.5"),
                ("PATH", "/usr/bin"),
            ])
            .expect("valid overrides");

        assert_eq!(settings.retry.attempts, 5);
        assert_eq!(settings.backoff.strategy, BackoffStrategy::Fixed);
        let circuit = settings.circuit.expect("circuit section created");
        assert_eq!(circuit.failures, 5);
        assert_eq!(circuit.window, Duration::from_millis(12_500));
    }

    #[test]
    fn test_fixed_delay_keeps_long_interval() {
        let settings = ResilienceSettings::from_toml_str(
            "[backoff]\nstrategy = \"fixed\"\ndelay = 45\njitter = false\n",
        )
        .expect("valid settings");
        let backoff = settings.backoff.to_backoff().expect("valid backoff");
        assert_eq!(backoff.calculate(0), Duration::from_secs(45));

        let mut settings = settings;
        settings.apply_overrides([("RESILIENT_BACKOFF_MAX_DELAY", "20")]).expect("valid override");
        let backoff = settings.backoff.to_backoff().expect("valid backoff");
        assert_eq!(backoff.calculate(0), Duration::from_secs(20));
    }

    #[test]
    fn test_bad_override_names_variable() {
        let mut settings = ResilienceSettings::default();
        let error = settings.apply_overrides([("RESILIENT_ATTEMPTS", "many")]).unwrap_err();
        assert!(error.to_string().contains("RESILIENT_ATTEMPTS"));

        let error = settings.apply_overrides([("RESILIENT_ATTEMPTS", "0")]).unwrap_err();
        assert!(matches!(error, ResilienceError::InvalidConfiguration { .. }));
    }
}
