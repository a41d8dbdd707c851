//! Promises
//!
//! A [`Promise`] is an immutable wrapper around an [`Upstream`]. Nothing
//! happens until the promise is consumed, either asynchronously with
//! [`then`](Promise::then) on a compute thread, or synchronously with
//! [`block`](Promise::block) on a blocking thread. Combinators build a new
//! promise around a new upstream and leave the original untouched.
//!
//! ```rust,ignore
//! use pexec_runtime::{blocking, Promise};
//!
//! // inside an execution, on a compute thread
//! blocking(|| load_user(7))
//!     .map(|user| Ok(user.name))
//!     .retry(2)
//!     .then(|name| {
//!         kinfo!("hello {}", name);
//!         Ok(())
//!     })?;
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use pexec_core::kdebug;
use pexec_core::{Downstream, ExecError, ExecResult, Outcome, Upstream};

use crate::backing::{panic_message, ExecutionBacking};
use crate::binding::ThreadBinding;
use crate::latch::Latch;

const THEN_REQUIRES_COMPUTE: &str =
    "Promise::then() can only be called on a compute thread (use Promise::block() on a blocking thread instead)";

const BLOCK_REQUIRES_BLOCKING: &str =
    "Promise::block() can only be used while blocking (use blocking() to move onto a blocking thread first)";

/// A value that will be produced later
pub struct Promise<T> {
    upstream: Arc<dyn Upstream<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self { upstream: Arc::clone(&self.upstream) }
    }
}

impl<T> std::fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Promise").finish_non_exhaustive()
    }
}

impl<T: Clone + Send + Sync + 'static> Promise<T> {
    /// Promise of a value known up front
    pub fn value(value: T) -> Self {
        Self::of(move |downstream: Downstream<T>| downstream.success(value.clone()))
    }
}

impl<T: Send + 'static> Promise<T> {
    /// Wrap any upstream
    pub fn of<U>(upstream: U) -> Self
    where
        U: Upstream<T> + 'static,
    {
        Self { upstream: Arc::new(upstream) }
    }

    pub fn from_arc(upstream: Arc<dyn Upstream<T>>) -> Self {
        Self { upstream }
    }

    /// Promise that always fails with `error`
    pub fn error(error: ExecError) -> Self {
        Self::of(move |downstream: Downstream<T>| downstream.error(error.clone()))
    }

    /// Promise that completes without a value
    pub fn empty() -> Self {
        Self::of(|downstream: Downstream<T>| downstream.complete())
    }

    /// Promise resolved by calling `f` on every connect
    ///
    /// `f` runs on whichever thread connects, so it must not block.
    /// Use [`blocking`](crate::blocking) for work that does.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() -> ExecResult<T> + Send + Sync + 'static,
    {
        Self::of(move |downstream: Downstream<T>| downstream.from_result(f()))
    }

    pub(crate) fn connect(&self, downstream: Downstream<T>) {
        self.upstream.connect(downstream);
    }

    /// Consume the value asynchronously
    ///
    /// Must be called on a compute thread inside an execution. The
    /// continuation runs later, as a job on the execution's event loop,
    /// and only if a value is produced. An upstream failure, or an `Err`
    /// from the continuation, goes to the execution's error handler.
    pub fn then<F>(self, continuation: F) -> ExecResult<()>
    where
        F: FnOnce(T) -> ExecResult<()> + Send + 'static,
    {
        ThreadBinding::require_compute_thread(THEN_REQUIRES_COMPUTE)?;
        let backing = ExecutionBacking::require()?;

        let handle = backing.open_stream();
        let sink_backing = Arc::clone(&backing);
        let downstream = Downstream::new(move |outcome: Outcome<T>| {
            // Reached while `connect` unwinds: the panic below is the one
            // error, so only close the stream.
            if thread::panicking() {
                return handle.complete();
            }
            handle.complete_with(move || {
                let result = match outcome {
                    Outcome::Success(value) => continuation(value),
                    Outcome::Complete => Ok(()),
                    Outcome::Failure(e) => Err(e),
                };
                if let Err(e) = result {
                    throw_error(&sink_backing, e);
                }
                Ok(())
            });
        });

        let upstream = &self.upstream;
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| upstream.connect(downstream))) {
            throw_error(&backing, ExecError::Panicked(panic_message(payload.as_ref())));
        }
        Ok(())
    }

    /// Build a new promise from this promise's upstream
    ///
    /// An error from `f` is returned as [`ExecError::Transform`].
    pub fn transform<O, F>(&self, f: F) -> ExecResult<Promise<O>>
    where
        O: Send + 'static,
        F: FnOnce(Arc<dyn Upstream<T>>) -> ExecResult<Arc<dyn Upstream<O>>>,
    {
        f(Arc::clone(&self.upstream))
            .map(Promise::from_arc)
            .map_err(|e| ExecError::Transform(Box::new(e)))
    }

    /// Map the value through `f`
    ///
    /// Failures and valueless completion pass through. An `Err` or a
    /// panic in `f` fails the new promise.
    pub fn map<O, F>(&self, f: F) -> Promise<O>
    where
        O: Send + 'static,
        F: Fn(T) -> ExecResult<O> + Send + Sync + 'static,
    {
        Promise::of(MapUpstream {
            source: Arc::clone(&self.upstream),
            f: Arc::new(f),
        })
    }

    /// Wait for the outcome on the calling thread
    ///
    /// Only legal on a blocking thread inside an execution. The upstream is
    /// connected from the execution's event loop; this thread waits until
    /// it signals, with no timeout. Returns the value, `None` for a
    /// valueless completion, or the failure as an error. If the runtime
    /// shuts down first, fails with [`ExecError::RuntimeShutdown`].
    pub fn block(self) -> ExecResult<Option<T>> {
        ThreadBinding::require_blocking_thread(BLOCK_REQUIRES_BLOCKING)?;
        let backing = ExecutionBacking::require()?;

        let latch = Arc::new(Latch::new());
        let slot: Arc<Mutex<Option<Outcome<T>>>> = Arc::new(Mutex::new(None));

        let upstream = self.upstream;
        let release = Arc::clone(&latch);
        let result = Arc::clone(&slot);
        backing.stream_subscribe(move |handle| {
            let sink_release = Arc::clone(&release);
            let sink_result = Arc::clone(&result);
            let downstream = Downstream::new(move |outcome| {
                if !thread::panicking() {
                    *sink_result.lock().unwrap_or_else(PoisonError::into_inner) = Some(outcome);
                    sink_release.release();
                }
                handle.complete();
            });
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| upstream.connect(downstream))) {
                let error = ExecError::Panicked(panic_message(payload.as_ref()));
                result
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get_or_insert(Outcome::Failure(error));
                release.release();
            }
        });

        // Once the compute pool is gone nothing will connect the upstream
        // or drain its result, so poll for that instead of waiting forever.
        let poll = backing.runtime().config.park_timeout;
        backing.event_loop_drain();
        while !latch.wait_timeout(poll) {
            if backing.runtime().compute.is_shutdown() && !latch.is_released() {
                return Err(ExecError::RuntimeShutdown);
            }
        }

        let outcome = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        outcome
            .ok_or_else(|| ExecError::Internal("block() released without an outcome".to_string()))?
            .into_value()
    }

    /// Resolve again on failure, up to `times` more attempts
    ///
    /// Only domain errors are retried; usage and internal errors pass
    /// through at once. Attempts run one after another on the event loop
    /// of the execution that connects. `retry(0)` makes exactly one attempt.
    pub fn retry(&self, times: u32) -> Promise<T> {
        Promise::of(RetryUpstream {
            source: Arc::clone(&self.upstream),
            times,
        })
    }
}

/// Route `error` to the execution's error channel from a fresh stream
fn throw_error(backing: &Arc<ExecutionBacking>, error: ExecError) {
    backing.stream_subscribe(move |handle| handle.complete_with(move || Err(error)));
}

struct MapUpstream<T, F> {
    source: Arc<dyn Upstream<T>>,
    f: Arc<F>,
}

impl<T, O, F> Upstream<O> for MapUpstream<T, F>
where
    T: Send + 'static,
    O: Send + 'static,
    F: Fn(T) -> ExecResult<O> + Send + Sync + 'static,
{
    fn connect(&self, downstream: Downstream<O>) {
        let f = Arc::clone(&self.f);
        self.source.connect(Downstream::new(move |outcome: Outcome<T>| match outcome {
            Outcome::Success(value) => {
                let mapped = panic::catch_unwind(AssertUnwindSafe(|| f(value)))
                    .unwrap_or_else(|payload| Err(ExecError::Panicked(panic_message(payload.as_ref()))));
                downstream.from_result(mapped);
            }
            Outcome::Complete => downstream.complete(),
            Outcome::Failure(e) => downstream.error(e),
        }));
    }
}

struct RetryUpstream<T> {
    source: Arc<dyn Upstream<T>>,
    times: u32,
}

impl<T: Send + 'static> Upstream<T> for RetryUpstream<T> {
    fn connect(&self, downstream: Downstream<T>) {
        let backing = match ExecutionBacking::require() {
            Ok(backing) => backing,
            Err(e) => return downstream.error(e),
        };
        RetryAttempt {
            source: Arc::clone(&self.source),
            remaining: self.times,
            attempt: 1,
            backing,
            downstream,
        }
        .run();
    }
}

/// One pending attempt of a retry
struct RetryAttempt<T> {
    source: Arc<dyn Upstream<T>>,
    /// Retries left after this attempt
    remaining: u32,
    attempt: u32,
    backing: Arc<ExecutionBacking>,
    downstream: Downstream<T>,
}

impl<T: Send + 'static> RetryAttempt<T> {
    fn run(self) {
        let RetryAttempt { source, remaining, attempt, backing, downstream } = self;
        let next_source = Arc::clone(&source);

        source.connect(Downstream::new(move |outcome: Outcome<T>| {
            let retryable = matches!(&outcome, Outcome::Failure(e) if e.is_retryable());
            if !retryable || remaining == 0 {
                if retryable {
                    kdebug!("giving up after {} attempts", attempt);
                }
                return downstream.accept(outcome);
            }

            if let Some(e) = outcome.error() {
                kdebug!("attempt {} failed: {} ({} retries left)", attempt, e, remaining);
            }
            let exec = Arc::clone(&backing);
            let next = RetryAttempt {
                source: next_source,
                remaining: remaining - 1,
                attempt: attempt + 1,
                backing,
                downstream,
            };
            exec.enqueue(move || {
                next.run();
                Ok(())
            });
        }));
    }
}
