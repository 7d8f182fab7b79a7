//! Success/failure algebra every decorated operation funnels through
//!
//! A decorated call never panics or propagates an uncaught error: it returns
//! an [`Outcome`], which is a plain `Result<T, Failure>`. [`Failure`] is the
//! type-erased error side. It holds either an error value (anything
//! implementing [`std::error::Error`]) or a plain value rendered as text, so
//! both "raised" and "returned" failures end up in the same shape.
//!
//! ```rust
//! use resilient::result::{Failure, Flatten, Outcome, ResultExt};
//!
//! let nested: Outcome<Outcome<u32>> = Ok(Err(Failure::value("bad input")));
//! let flat = nested.flatten_nested();
//! assert!(flat.failure());
//! assert_eq!(flat.unwrap_err().to_string(), "bad input");
//! ```

use std::any::{type_name, Any};
use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::error::{ErrorType, ResilienceError, TypedError};

/// An error that remembers the short name of its concrete type
///
/// Implemented for every `std::error::Error + Send + Sync + 'static`, so a
/// [`SharedError`] keeps its class through any number of raise and re-wrap
/// round trips.
pub trait ClassifiedError: StdError + Send + Sync + 'static {
    /// Short type name, e.g. `io::Error` or `ParseIntError`
    fn class_name(&self) -> Cow<'static, str>;

    /// View as a plain error trait object
    fn as_std(&self) -> &(dyn StdError + Send + Sync + 'static);
}

impl<E> ClassifiedError for E
where
    E: StdError + Send + Sync + 'static,
{
    fn class_name(&self) -> Cow<'static, str> {
        short_type_name::<E>()
    }

    fn as_std(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self
    }
}

impl dyn ClassifiedError {
    /// Attempt to view the error as a concrete type
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.as_std().downcast_ref::<E>()
    }
}

/// Shared, thread-safe error handle
///
/// Raising a fault-shaped [`Failure`] hands back this same handle, so the
/// caller sees the original error object rather than a copy.
pub type SharedError = Arc<dyn ClassifiedError>;

/// Result of a decorated operation
pub type Outcome<T> = Result<T, Failure>;

#[derive(Clone)]
enum Repr {
    Fault(SharedError),
    Value(String),
}

/// The failing side of an [`Outcome`]
///
/// Built from any error with `?`/`From`, or from a plain value with
/// [`Failure::value`]. Records the class name of what it was built from for
/// observability.
#[derive(Clone)]
pub struct Failure {
    repr: Repr,
    class: Cow<'static, str>,
}

impl Failure {
    /// Wrap an error value
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        // A re-raised handle is unwrapped so identity and class survive a
        // round trip.
        if let Some(inner) = (&error as &dyn Any).downcast_ref::<SharedError>() {
            return Self::from_shared(Arc::clone(inner));
        }
        Self { class: short_type_name::<E>(), repr: Repr::Fault(Arc::new(error)) }
    }

    /// Wrap an already shared error handle without re-boxing it
    pub fn from_shared(error: SharedError) -> Self {
        Self { class: ClassifiedError::class_name(&*error), repr: Repr::Fault(error) }
    }

    /// Wrap a non-error value; it is stored as its `Display` text
    pub fn value<V: fmt::Display>(value: V) -> Self {
        Self { repr: Repr::Value(value.to_string()), class: short_type_name::<V>() }
    }

    /// Class name of the value this failure was built from
    pub fn class_name(&self) -> &str {
        &self.class
    }

    /// Whether this failure wraps an error value rather than a plain value
    pub const fn is_fault(&self) -> bool {
        matches!(self.repr, Repr::Fault(_))
    }

    /// The wrapped error, when there is one
    pub fn as_error(&self) -> Option<&(dyn StdError + 'static)> {
        match &self.repr {
            Repr::Fault(error) => {
                let error: &(dyn StdError + 'static) = ClassifiedError::as_std(&**error);
                Some(error)
            }
            Repr::Value(_) => None,
        }
    }

    /// Attempt to view the wrapped error as a concrete type
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        match &self.repr {
            Repr::Fault(error) => error.downcast_ref::<E>(),
            Repr::Value(_) => None,
        }
    }

    /// Convert into an error to propagate
    ///
    /// Fault-shaped failures return the stored handle unchanged. Value-shaped
    /// failures become [`ResilienceError::Unwrapped`], whose message is
    /// `Result failed with error: {value}`.
    pub fn raise(self) -> SharedError {
        match self.repr {
            Repr::Fault(error) => error,
            Repr::Value(value) => Arc::new(ResilienceError::Unwrapped(value)),
        }
    }

    /// The engine error, looking through an [`ErrorType`] rewrap
    fn engine_error(&self) -> Option<&ResilienceError> {
        match self.downcast_ref::<TypedError>() {
            Some(typed) => typed.failure().engine_error(),
            None => self.downcast_ref::<ResilienceError>(),
        }
    }

    /// Whether the engine abandoned the attempt at its deadline
    pub fn is_timeout(&self) -> bool {
        matches!(self.engine_error(), Some(ResilienceError::Timeout { .. }))
    }

    /// Whether an open circuit rejected the call
    pub fn is_circuit_open(&self) -> bool {
        matches!(self.engine_error(), Some(ResilienceError::CircuitOpen { .. }))
    }

    /// Classification label, when the failure was rewrapped under one
    pub fn error_type(&self) -> Option<&ErrorType> {
        self.downcast_ref::<TypedError>().map(TypedError::error_type)
    }
}

impl<E> From<E> for Failure
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Fault(error) => fmt::Display::fmt(error, f),
            Repr::Value(value) => f.write_str(value),
        }
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = self.to_string();
        f.debug_struct("Failure")
            .field("class", &self.class)
            .field("fault", &self.is_fault())
            .field("message", &message)
            .finish()
    }
}

/// Last path segment of a type name
///
/// A bare `Error` keeps its public module, so `std::io::error::Error` is
/// reported as `io::Error`.
fn short_type_name<T: ?Sized>() -> Cow<'static, str> {
    let full = type_name::<T>().trim_start_matches('&');
    let base = full.split('<').next().unwrap_or(full);
    let mut segments = base.rsplit("::");
    let name = segments.next().unwrap_or(base);
    if name != "Error" {
        return Cow::Borrowed(name);
    }
    match segments.find(|segment| *segment != "error") {
        Some(module) => Cow::Owned(format!("{module}::{name}")),
        None => Cow::Borrowed(name),
    }
}

/// Inspectors for [`Outcome`]
pub trait ResultExt<T> {
    /// `true` for `Ok`
    fn success(&self) -> bool;

    /// `true` for `Err`; always the complement of [`ResultExt::success`]
    fn failure(&self) -> bool;

    /// Hand back the payload, or the error to propagate with `?`
    ///
    /// # Errors
    ///
    /// Returns the failure converted by [`Failure::raise`].
    fn raise(self) -> Result<T, SharedError>;
}

impl<T> ResultExt<T> for Outcome<T> {
    fn success(&self) -> bool {
        self.is_ok()
    }

    fn failure(&self) -> bool {
        self.is_err()
    }

    fn raise(self) -> Result<T, SharedError> {
        self.map_err(Failure::raise)
    }
}

/// Collapse one level of `Ok(Result)` nesting
///
/// The nesting depth is part of the static type, so a three-deep result
/// flattens with two chained calls. An `Err` at any depth becomes the outer
/// `Err`.
pub trait Flatten<T> {
    /// Collapse `Ok(Ok(v))` into `Ok(v)` and `Ok(Err(e))` into `Err(e)`
    fn flatten_nested(self) -> Outcome<T>;
}

impl<T, E, F> Flatten<T> for Result<Result<T, E>, F>
where
    E: Into<Failure>,
    F: Into<Failure>,
{
    fn flatten_nested(self) -> Outcome<T> {
        match self {
            Ok(inner) => inner.map_err(Into::into),
            Err(outer) => Err(outer.into()),
        }
    }
}

/// Await pending operations in order and gather their values
///
/// Short-circuits on the first failure: later operations are never polled.
/// Empty input yields `Ok(vec![])`.
///
/// # Errors
///
/// Returns the first failure in iteration order.
pub async fn collect<I, Fut, T, E>(operations: I) -> Outcome<Vec<T>>
where
    I: IntoIterator<Item = Fut>,
    Fut: Future<Output = Result<T, E>>,
    E: Into<Failure>,
{
    let operations = operations.into_iter();
    let mut values = Vec::with_capacity(operations.size_hint().0);
    for operation in operations {
        values.push(operation.await.map_err(Into::into)?);
    }
    Ok(values)
}
