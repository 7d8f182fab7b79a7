//! Named presets
//!
//! A preset is a function building a [`Resilient`] for a common kind of
//! call. The process-wide registry starts with `network`, `parsing`, `api`,
//! `db` and `ml`; callers may register their own or replace a built-in.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::debug;

use super::handlers::stop_on_circuit_open;
use super::Resilient;
use crate::error::{ErrorType, ResilienceError, ResilienceResult};
use crate::resilience::{Backoff, Retry};

/// Builds a fresh [`Resilient`] for one preset
pub type PresetBuilder = Arc<dyn Fn() -> Resilient + Send + Sync>;

static PRESETS: Lazy<PresetRegistry> = Lazy::new(PresetRegistry::with_builtins);

/// The process-wide preset registry
pub fn presets() -> &'static PresetRegistry {
    &PRESETS
}

/// Look up `name` in the process-wide registry
///
/// # Errors
///
/// Returns [`ResilienceError::UnknownPreset`] for unregistered names.
pub fn preset(name: &str) -> ResilienceResult<Resilient> {
    PRESETS.get(name)
}

/// Name to builder map
#[derive(Default)]
pub struct PresetRegistry {
    builders: RwLock<BTreeMap<String, PresetBuilder>>,
}

impl std::fmt::Debug for PresetRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresetRegistry").field("names", &self.names()).finish()
    }
}

impl PresetRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in presets
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register("network", network);
        registry.register("parsing", parsing);
        registry.register("api", || Resilient::new().retry(Retry::api()));
        registry.register("db", || Resilient::new().retry(Retry::db()));
        registry.register("ml", || Resilient::new().retry(Retry::ml()));
        registry
    }

    /// Add or replace a preset
    pub fn register<S, B>(&self, name: S, builder: B)
    where
        S: Into<String>,
        B: Fn() -> Resilient + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(target: "resilient", preset = %name, "registering preset");
        self.builders.write().insert(name, Arc::new(builder));
    }

    /// Build the preset registered under `name`
    ///
    /// # Errors
    ///
    /// Returns [`ResilienceError::UnknownPreset`] listing the registered
    /// names when `name` is missing.
    pub fn get(&self, name: &str) -> ResilienceResult<Resilient> {
        let builder = self.builders.read().get(name).cloned();
        match builder {
            Some(builder) => Ok(builder()),
            None => Err(ResilienceError::UnknownPreset {
                name: name.to_string(),
                available: self.names(),
            }),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders.read().contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        self.builders.read().keys().cloned().collect()
    }
}

/// Transport failures: 3 attempts, exponential backoff, no retries into an
/// open circuit
fn network() -> Resilient {
    Resilient::new()
        .error_type(ErrorType::NETWORK)
        .attempts(3)
        .backoff(Backoff::default())
        .handler(stop_on_circuit_open)
}

/// Decode failures: 2 attempts a short fixed delay apart
fn parsing() -> Resilient {
    Resilient::new()
        .error_type(ErrorType::PARSING)
        .attempts(2)
        .backoff(Backoff::fixed(Duration::from_millis(100)).without_jitter())
}
