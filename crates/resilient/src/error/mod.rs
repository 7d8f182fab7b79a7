//! Error types for the resilience engine
//!
//! Two families live here:
//!
//! 1. **[`ResilienceError`]**: failures produced by the engine itself (an
//!    open circuit, an expired deadline) plus the configuration errors that
//!    surface synchronously to the caller. Exhausted retries produce no error
//!    of their own: the caller gets the last attempt's failure unchanged.
//!
//! 2. **[`TypedError`]**: the rewrap applied when a decorated operation is
//!    configured with an [`ErrorType`]. It keeps the original message and
//!    exposes the original error through `source()`.
//!
//! Operation failures themselves travel as [`Failure`] values; see
//! [`crate::result`].

use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::result::Failure;

/// Errors raised by the resilience engine
#[derive(Debug, Error)]
pub enum ResilienceError {
    /// Admission rejected by an open circuit; the operation was not invoked
    #[error("Circuit breaker open: too many failures ({failures}/{threshold}) for {key}")]
    CircuitOpen { key: String, failures: u32, threshold: u32 },

    /// A single attempt ran past its deadline
    #[error("Timeout after {:?}s", .after.as_secs_f64())]
    Timeout { after: Duration },

    /// Lookup of a preset name that was never registered
    #[error("Unknown preset '{name}'. Available: {}", .available.join(", "))]
    UnknownPreset { name: String, available: Vec<String> },

    /// A policy was built with values outside its domain
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// A value-shaped failure was raised
    #[error("Result failed with error: {0}")]
    Unwrapped(String),

    /// Settings could not be read or parsed
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl ResilienceError {
    /// Shorthand for [`ResilienceError::InvalidConfiguration`]
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfiguration { message: message.into() }
    }

    /// Shorthand for [`ResilienceError::Config`]
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into() }
    }

    /// Whether the engine, not the wrapped operation, produced this error
    pub const fn is_engine_failure(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. } | Self::Timeout { .. })
    }
}

/// Result alias for configuration-time operations
pub type ResilienceResult<T> = Result<T, ResilienceError>;

/// Classification label attached to a final failure
///
/// Presets use the built-in [`ErrorType::NETWORK`] and [`ErrorType::PARSING`]
/// labels; callers may mint their own with [`ErrorType::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ErrorType(Cow<'static, str>);

impl ErrorType {
    /// Transport-level failures (connections, DNS, resets)
    pub const NETWORK: Self = Self(Cow::Borrowed("network"));
    /// Malformed input that could not be decoded
    pub const PARSING: Self = Self(Cow::Borrowed("parsing"));

    /// Create a custom error type label
    pub fn new<S: Into<Cow<'static, str>>>(name: S) -> Self {
        Self(name.into())
    }

    /// The label text
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A final failure rewrapped under an [`ErrorType`]
///
/// `Display` yields the original message unchanged; the label is available
/// through [`TypedError::error_type`] and the original error through
/// `source()`.
#[derive(Debug, Clone)]
pub struct TypedError {
    error_type: ErrorType,
    message: String,
    source: Failure,
}

impl TypedError {
    /// Rewrap `failure` under `error_type`
    pub fn new(error_type: ErrorType, failure: Failure) -> Self {
        let message = failure.to_string();
        Self { error_type, message, source: failure }
    }

    /// The classification label
    pub const fn error_type(&self) -> &ErrorType {
        &self.error_type
    }

    /// The original message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The failure that was rewrapped
    pub const fn failure(&self) -> &Failure {
        &self.source
    }
}

impl fmt::Display for TypedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for TypedError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_error()
    }
}
