//! Nesting policies around a base operation
//!
//! Every policy implements [`Decorator`]: given an operation it returns a new
//! operation of the same shape with the policy applied. [`compose`] folds a
//! list of decorators so the first one ends up outermost:
//!
//! ```text
//! compose([a, b, c], op) == a(b(c(op)))
//! ```
//!
//! Composition adds no behaviour of its own.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::result::{Failure, Outcome};

/// Type-erased asynchronous operation
pub type AsyncOperation<T> = Arc<dyn Fn() -> BoxFuture<'static, Outcome<T>> + Send + Sync>;

/// Type-erased blocking operation
pub type BlockingOperation<T> = Arc<dyn Fn() -> Outcome<T> + Send + Sync>;

/// A policy that can wrap an operation
pub trait Decorator<T: Send + 'static>: Send + Sync {
    /// Wrap an asynchronous operation
    fn decorate(&self, inner: AsyncOperation<T>) -> AsyncOperation<T>;

    /// Wrap a blocking operation
    fn decorate_blocking(&self, inner: BlockingOperation<T>) -> BlockingOperation<T>;
}

/// Erase an async closure into an [`AsyncOperation`]
pub fn operation<F, Fut, T, E>(f: F) -> AsyncOperation<T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Into<Failure> + 'static,
{
    Arc::new(move || {
        let pending = f();
        async move { pending.await.map_err(Into::into) }.boxed()
    })
}

/// Erase a blocking closure into a [`BlockingOperation`]
pub fn blocking_operation<F, T, E>(f: F) -> BlockingOperation<T>
where
    F: Fn() -> Result<T, E> + Send + Sync + 'static,
    E: Into<Failure>,
{
    Arc::new(move || f().map_err(Into::into))
}

/// Nest `layers` around `base`, first layer outermost
pub fn compose<T: Send + 'static>(
    layers: &[&dyn Decorator<T>],
    base: AsyncOperation<T>,
) -> AsyncOperation<T> {
    layers.iter().rev().fold(base, |inner, layer| layer.decorate(inner))
}

/// Blocking counterpart of [`compose`]
pub fn compose_blocking<T: Send + 'static>(
    layers: &[&dyn Decorator<T>],
    base: BlockingOperation<T>,
) -> BlockingOperation<T> {
    layers.iter().rev().fold(base, |inner, layer| layer.decorate_blocking(inner))
}

/// Owned list of decorators, applied in insertion order
pub struct Compose<T: Send + 'static> {
    layers: Vec<Box<dyn Decorator<T>>>,
}

impl<T: Send + 'static> Compose<T> {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Append a layer inside the ones already added
    #[must_use]
    pub fn layer<D: Decorator<T> + 'static>(mut self, decorator: D) -> Self {
        self.layers.push(Box::new(decorator));
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Wrap an asynchronous operation
    pub fn wrap(&self, base: AsyncOperation<T>) -> AsyncOperation<T> {
        self.layers.iter().rev().fold(base, |inner, layer| layer.decorate(inner))
    }

    /// Wrap a blocking operation
    pub fn wrap_blocking(&self, base: BlockingOperation<T>) -> BlockingOperation<T> {
        self.layers.iter().rev().fold(base, |inner, layer| layer.decorate_blocking(inner))
    }
}

impl<T: Send + 'static> Default for Compose<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> fmt::Debug for Compose<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compose").field("layers", &self.layers.len()).finish()
    }
}
