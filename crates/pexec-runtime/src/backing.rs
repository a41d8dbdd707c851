//! Per-execution event loop
//!
//! An [`ExecutionBacking`] is the context of one logical execution (for
//! example one in-flight request). It owns a FIFO queue of pending jobs
//! and is pinned to a single compute worker, which is the only thread
//! that ever drains it. That gives the single-active-job guarantee: jobs
//! of one execution never run concurrently, and run in enqueue order.
//!
//! Any thread may enqueue. A thread that is not currently draining the
//! execution asks the pinned worker to drain it.
//!
//! Work that finishes later (a blocking call, a `block()` bridge, an I/O
//! completion) holds an open stream via [`StreamHandle`]. The execution
//! is finished once a drain ends with an empty queue and no open streams.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crossbeam_queue::SegQueue;

use pexec_core::{kdebug, kerror, ktrace, kwarn};
use pexec_core::{ExecError, ExecResult, ExecutionId, ThreadRole};

use crate::binding::ThreadBinding;
use crate::latch::Latch;
use crate::runtime::RuntimeShared;
use crate::worker;

/// Unit of work on an execution's event loop
pub(crate) type Job = Box<dyn FnOnce() -> ExecResult<()> + Send>;

/// Receives every error the execution's jobs produce
pub(crate) type ErrorHandler = Box<dyn FnMut(ExecError) + Send>;

/// Runs once when the execution finishes
pub(crate) type CompleteHandler = Box<dyn FnOnce() + Send>;

/// Scheduler context of one logical execution
pub struct ExecutionBacking {
    id: ExecutionId,

    /// Compute worker this execution is pinned to
    worker: usize,

    shared: Arc<RuntimeShared>,

    /// Pending jobs, FIFO
    queue: SegQueue<Job>,

    open_streams: AtomicUsize,

    /// A drain is running (on the pinned worker)
    draining: AtomicBool,

    /// Sitting in the pinned worker's run queue
    scheduled: AtomicBool,

    finished: AtomicBool,

    jobs_run: AtomicU64,

    on_error: Mutex<ErrorHandler>,

    on_complete: Mutex<Option<CompleteHandler>>,

    done: Latch,
}

impl ExecutionBacking {
    pub(crate) fn new(
        id: ExecutionId,
        worker: usize,
        shared: Arc<RuntimeShared>,
        on_error: ErrorHandler,
        on_complete: Option<CompleteHandler>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            worker,
            shared,
            queue: SegQueue::new(),
            open_streams: AtomicUsize::new(0),
            draining: AtomicBool::new(false),
            scheduled: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            jobs_run: AtomicU64::new(0),
            on_error: Mutex::new(on_error),
            on_complete: Mutex::new(on_complete),
            done: Latch::new(),
        })
    }

    /// Execution bound to the calling thread
    ///
    /// Fails with [`ExecError::NoExecution`] outside a managed execution.
    pub fn require() -> ExecResult<Arc<Self>> {
        ThreadBinding::execution().ok_or(ExecError::NoExecution)
    }

    /// Like [`require`](Self::require), without the error
    pub fn current() -> Option<Arc<Self>> {
        ThreadBinding::execution()
    }

    #[inline]
    pub fn id(&self) -> ExecutionId {
        self.id
    }

    /// Compute worker index this execution is pinned to
    #[inline]
    pub fn worker(&self) -> usize {
        self.worker
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Number of jobs run so far
    pub fn jobs_run(&self) -> u64 {
        self.jobs_run.load(Ordering::Relaxed)
    }

    pub(crate) fn runtime(&self) -> &RuntimeShared {
        &self.shared
    }

    /// Append a job to the event loop
    ///
    /// Jobs run on the pinned compute worker in FIFO order. An `Err`
    /// returned by the job goes to the execution's error handler.
    pub fn enqueue<F>(self: &Arc<Self>, job: F)
    where
        F: FnOnce() -> ExecResult<()> + Send + 'static,
    {
        self.queue.push(Box::new(job));
        self.nudge();
    }

    /// Open a stream and enqueue `handler` with its handle
    ///
    /// The execution stays alive until the handle is completed.
    pub fn stream_subscribe<F>(self: &Arc<Self>, handler: F)
    where
        F: FnOnce(StreamHandle) + Send + 'static,
    {
        let handle = self.open_stream();
        self.enqueue(move || {
            handler(handle);
            Ok(())
        });
    }

    /// Open a stream without enqueuing anything
    ///
    /// For adapters whose work happens off the event loop (a blocking
    /// pool, an I/O completion): hold the handle until the result is back,
    /// then deliver it with [`StreamHandle::complete_with`].
    pub fn open_stream(self: &Arc<Self>) -> StreamHandle {
        self.open_streams.fetch_add(1, Ordering::AcqRel);
        StreamHandle { backing: Some(Arc::clone(self)) }
    }

    /// Run the pending queue until empty
    ///
    /// On the pinned compute worker this drains inline, including work
    /// enqueued during the drain. A nested call made from inside the
    /// drain returns at once and leaves the work to the outer loop. From
    /// any other thread this hands the drain to the pinned worker.
    pub fn event_loop_drain(self: &Arc<Self>) {
        if ThreadBinding::is_compute() && worker::current_worker_id() == Some(self.worker) {
            self.drain();
        } else {
            self.schedule();
        }
    }

    /// Ask the pinned worker to drain, unless this thread is draining us now
    fn nudge(self: &Arc<Self>) {
        if !(ThreadBinding::is_compute() && ThreadBinding::is_serving(self)) {
            self.schedule();
        }
    }

    pub(crate) fn schedule(self: &Arc<Self>) {
        if self.scheduled.swap(true, Ordering::AcqRel) {
            return;
        }
        if !self.shared.compute.submit(self.worker, Arc::clone(self)) {
            self.abandon();
        }
    }

    /// Give up on the execution once no compute worker will drain it
    ///
    /// Pending jobs are dropped unrun, which resolves any downstreams they
    /// held. The error channel sees one [`ExecError::RuntimeShutdown`] and
    /// joiners are released; `on_complete` does not run.
    pub(crate) fn abandon(self: &Arc<Self>) {
        self.scheduled.store(false, Ordering::Release);
        let mut dropped = 0usize;
        // Dropping a job may enqueue (and abandon) again; the loop picks
        // those up too.
        while let Some(job) = self.queue.pop() {
            drop(job);
            dropped += 1;
        }
        if self.finished.swap(true, Ordering::AcqRel) {
            return;
        }
        kwarn!("execution {} abandoned at shutdown ({} pending jobs dropped)", self.id, dropped);
        self.report(ExecError::RuntimeShutdown);
        self.done.release();
    }

    /// Entry point for the compute worker that popped us off its run queue
    pub(crate) fn run_scheduled(self: &Arc<Self>) {
        self.scheduled.store(false, Ordering::Release);
        self.drain();
    }

    fn drain(self: &Arc<Self>) {
        if self.draining.swap(true, Ordering::AcqRel) {
            return;
        }

        let binding = ThreadBinding::enter(ThreadRole::Compute, Some(Arc::clone(self)));
        let mut ran = 0u64;
        while let Some(job) = self.queue.pop() {
            self.run_job(job);
            ran += 1;
        }
        self.jobs_run.fetch_add(ran, Ordering::Relaxed);
        ktrace!("drained {} jobs", ran);
        drop(binding);

        self.draining.store(false, Ordering::Release);

        // Anything pushed after the loop saw an empty queue but before
        // `draining` cleared was pushed by a non-serving thread, which
        // already scheduled us. Re-check anyway before finishing.
        if !self.queue.is_empty() {
            self.schedule();
            return;
        }
        self.check_finished();
    }

    fn run_job(&self, job: Job) {
        match panic::catch_unwind(AssertUnwindSafe(job)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self.report(e),
            Err(payload) => self.report(ExecError::Panicked(panic_message(payload.as_ref()))),
        }
    }

    /// Deliver an error to the execution's error channel
    fn report(&self, error: ExecError) {
        if error.is_usage() {
            kwarn!("execution {} misused the runtime: {}", self.id, error);
        } else {
            kdebug!("execution error: {}", error);
        }
        let mut handler = self.on_error.lock().unwrap_or_else(PoisonError::into_inner);
        if panic::catch_unwind(AssertUnwindSafe(|| (*handler)(error))).is_err() {
            kerror!("error handler of execution {} panicked", self.id);
        }
    }

    fn close_stream(self: &Arc<Self>) {
        let prev = self.open_streams.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "stream closed more often than opened");
        // The last close may finish the execution; make sure a drain sees it.
        if prev == 1 {
            self.nudge();
        }
    }

    fn check_finished(&self) {
        if self.open_streams.load(Ordering::Acquire) != 0 || !self.queue.is_empty() {
            return;
        }
        if self.finished.swap(true, Ordering::AcqRel) {
            return;
        }

        kdebug!("execution {} finished after {} jobs", self.id, self.jobs_run());
        let on_complete = self
            .on_complete
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(on_complete) = on_complete {
            if panic::catch_unwind(AssertUnwindSafe(on_complete)).is_err() {
                kerror!("completion handler of execution {} panicked", self.id);
            }
        }
        self.done.release();
    }

    pub(crate) fn wait_finished(&self) {
        self.done.wait();
    }

    pub(crate) fn wait_finished_timeout(&self, timeout: Duration) -> bool {
        self.done.wait_timeout(timeout)
    }
}

impl std::fmt::Debug for ExecutionBacking {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionBacking")
            .field("id", &self.id)
            .field("worker", &self.worker)
            .field("open_streams", &self.open_streams.load(Ordering::Relaxed))
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// One open unit of work on an execution
///
/// Completing the handle closes the stream. A handle dropped without
/// being completed closes it too, with a warning.
pub struct StreamHandle {
    backing: Option<Arc<ExecutionBacking>>,
}

impl StreamHandle {
    /// Execution this stream belongs to
    pub fn execution_id(&self) -> ExecutionId {
        self.backing.as_ref().map_or(ExecutionId::NONE, |b| b.id())
    }

    /// Enqueue work on the execution without closing the stream
    pub fn event<F>(&self, action: F)
    where
        F: FnOnce() -> ExecResult<()> + Send + 'static,
    {
        if let Some(backing) = &self.backing {
            backing.enqueue(action);
        }
    }

    /// Close the stream
    pub fn complete(mut self) {
        if let Some(backing) = self.backing.take() {
            backing.close_stream();
        }
    }

    /// Run `action` on the event loop, then close the stream
    ///
    /// An `Err` from `action` goes to the execution's error handler.
    pub fn complete_with<F>(mut self, action: F)
    where
        F: FnOnce() -> ExecResult<()> + Send + 'static,
    {
        if let Some(backing) = self.backing.take() {
            // The inner handle keeps the stream open until the action has
            // run, and closes it even if the action panics.
            let handle = StreamHandle { backing: Some(Arc::clone(&backing)) };
            backing.enqueue(move || {
                let result = action();
                handle.complete();
                result
            });
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        if let Some(backing) = self.backing.take() {
            kwarn!("stream handle of execution {} dropped without completing", backing.id());
            backing.close_stream();
        }
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("execution", &self.execution_id())
            .finish()
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
