//! Upstream/Downstream protocol
//!
//! An [`Upstream`] produces a value asynchronously. Each call to
//! [`Upstream::connect`] hands it a fresh [`Downstream`], and the upstream
//! must eventually signal exactly one of `success`, `error` or `complete`
//! on it, exactly once.
//!
//! The "exactly one" half is enforced by the type system: every terminal
//! method takes the downstream by value. The "at least one" half is
//! checked at runtime: a downstream dropped without a terminal signal
//! logs an error and resolves its sink with [`ExecError::Internal`], so a
//! broken producer surfaces as a failure instead of a hung promise.

use crate::error::{ExecError, ExecResult};
use crate::outcome::Outcome;

/// Producer side of the protocol
///
/// Upstreams may be connected more than once (`retry` resolves the same
/// upstream again), so `connect` takes `&self`. Every connect is an
/// independent resolution with its own downstream.
pub trait Upstream<T>: Send + Sync {
    /// Start one resolution, signalling the result on `downstream`
    fn connect(&self, downstream: Downstream<T>);
}

impl<T, F> Upstream<T> for F
where
    F: Fn(Downstream<T>) + Send + Sync,
{
    #[inline]
    fn connect(&self, downstream: Downstream<T>) {
        self(downstream)
    }
}

type Sink<T> = Box<dyn FnOnce(Outcome<T>) + Send>;

/// Consumer side of the protocol
///
/// A pure sink: it never calls back into the upstream.
pub struct Downstream<T> {
    sink: Option<Sink<T>>,
}

impl<T> Downstream<T> {
    /// Create a downstream delivering into `sink`
    pub fn new<F>(sink: F) -> Self
    where
        F: FnOnce(Outcome<T>) + Send + 'static,
    {
        Self { sink: Some(Box::new(sink)) }
    }

    /// Signal a value
    #[inline]
    pub fn success(self, value: T) {
        self.accept(Outcome::Success(value))
    }

    /// Signal a failure
    #[inline]
    pub fn error(self, error: ExecError) {
        self.accept(Outcome::Failure(error))
    }

    /// Signal completion without a value
    #[inline]
    pub fn complete(self) {
        self.accept(Outcome::Complete)
    }

    /// Signal `Ok` as success and `Err` as error
    #[inline]
    pub fn from_result(self, result: ExecResult<T>) {
        self.accept(Outcome::from_result(result))
    }

    /// Forward an already-built outcome unchanged
    pub fn accept(mut self, outcome: Outcome<T>) {
        if let Some(sink) = self.sink.take() {
            sink(outcome);
        }
    }
}

impl<T> Drop for Downstream<T> {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.take() {
            crate::kerror!("downstream dropped without a terminal signal");
            sink(Outcome::Failure(ExecError::Internal(
                "downstream dropped without a terminal signal".to_string(),
            )));
        }
    }
}

impl<T> std::fmt::Debug for Downstream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downstream")
            .field("resolved", &self.sink.is_none())
            .finish()
    }
}
