//! Cached blocking thread pool
//!
//! Threads are spawned on demand up to `max_blocking_threads` and retire
//! after sitting idle for `blocking_keep_alive`. Tasks wait in a single
//! FIFO queue when the pool is at its ceiling.
//!
//! [`blocking`] adapts a blocking function into a [`Promise`]: the work
//! runs on this pool and the result is delivered back on the owning
//! execution's compute thread.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use pexec_core::kprint::{self, ThreadTag};
use pexec_core::{kdebug, kerror, kwarn};
use pexec_core::{Downstream, ExecError, ExecResult, ThreadRole, Upstream, WorkerError};

use crate::backing::{panic_message, ExecutionBacking};
use crate::binding::ThreadBinding;
use crate::promise::Promise;

pub(crate) type Task = Box<dyn FnOnce() + Send>;

struct PoolState {
    queue: VecDeque<Task>,
    /// Live threads
    threads: usize,
    /// Threads waiting for a task
    idle: usize,
    shutdown: bool,
}

struct BlockingInner {
    state: Mutex<PoolState>,
    condvar: Condvar,
    max_threads: usize,
    keep_alive: Duration,
    next_thread_id: AtomicUsize,
    debug: bool,
}

impl BlockingInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// On-demand pool of threads allowed to block
pub(crate) struct BlockingPool {
    inner: Arc<BlockingInner>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl BlockingPool {
    pub(crate) fn new(max_threads: usize, keep_alive: Duration, debug: bool) -> Self {
        Self {
            inner: Arc::new(BlockingInner {
                state: Mutex::new(PoolState {
                    queue: VecDeque::new(),
                    threads: 0,
                    idle: 0,
                    shutdown: false,
                }),
                condvar: Condvar::new(),
                max_threads,
                keep_alive,
                next_thread_id: AtomicUsize::new(0),
                debug,
            }),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Queue a task, spawning a thread if none is free
    pub(crate) fn submit(&self, task: Task) -> ExecResult<()> {
        let mut state = self.inner.lock();
        if state.shutdown {
            return Err(ExecError::RuntimeShutdown);
        }
        state.queue.push_back(task);

        if state.queue.len() > state.idle {
            if state.threads < self.inner.max_threads {
                state.threads += 1;
                drop(state);
                if let Err(e) = self.spawn_thread() {
                    self.inner.lock().threads -= 1;
                    // The task stays queued for any thread that frees up.
                    kerror!("{}", e);
                }
                return Ok(());
            }
            kwarn!(
                "blocking pool at its ceiling of {} threads; task queued",
                self.inner.max_threads
            );
        }
        drop(state);
        self.inner.condvar.notify_one();
        Ok(())
    }

    fn spawn_thread(&self) -> Result<(), WorkerError> {
        let n = self.inner.next_thread_id.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name(format!("pexec-blocking-{}", n))
            .spawn(move || blocking_main_loop(inner, n))
            .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
        Ok(())
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.inner.lock().shutdown
    }

    /// Live thread count
    pub(crate) fn thread_count(&self) -> usize {
        self.inner.lock().threads
    }

    /// Stop accepting tasks, let threads finish what is queued, and join them
    pub(crate) fn shutdown(&self) {
        {
            let mut state = self.inner.lock();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
        }
        self.inner.condvar.notify_all();

        let handles = std::mem::take(&mut *self.handles.lock().unwrap_or_else(PoisonError::into_inner));
        if ThreadBinding::is_blocking() {
            kwarn!("runtime shut down from a blocking thread; not joining the blocking pool");
            return;
        }
        for handle in handles {
            if handle.join().is_err() {
                kwarn!("blocking thread panicked");
            }
        }
    }
}

fn blocking_main_loop(inner: Arc<BlockingInner>, n: usize) {
    kprint::set_thread_tag(ThreadTag::Blocking(n));
    if inner.debug {
        kdebug!("blocking thread started");
    }

    let mut state = inner.lock();
    loop {
        if let Some(task) = state.queue.pop_front() {
            drop(state);
            if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                kerror!("blocking task panicked outside its promise");
            }
            state = inner.lock();
            continue;
        }
        if state.shutdown {
            break;
        }

        state.idle += 1;
        let (guard, timeout) = inner
            .condvar
            .wait_timeout(state, inner.keep_alive)
            .unwrap_or_else(PoisonError::into_inner);
        state = guard;
        state.idle -= 1;

        if timeout.timed_out() && state.queue.is_empty() {
            if inner.debug {
                kdebug!("idle blocking thread retiring");
            }
            break;
        }
    }
    state.threads -= 1;
}

/// Run `f` on the blocking pool as a promise
///
/// Each connect submits one call of `f`. The result is delivered on the
/// compute thread of the execution that connected, and the execution
/// stays open until it has been. Connecting outside an execution fails
/// the downstream with [`ExecError::NoExecution`].
pub fn blocking<T, F>(f: F) -> Promise<T>
where
    T: Send + 'static,
    F: Fn() -> ExecResult<T> + Send + Sync + 'static,
{
    Promise::of(BlockingUpstream { work: Arc::new(f) })
}

struct BlockingUpstream<F> {
    work: Arc<F>,
}

impl<T, F> Upstream<T> for BlockingUpstream<F>
where
    T: Send + 'static,
    F: Fn() -> ExecResult<T> + Send + Sync + 'static,
{
    fn connect(&self, downstream: Downstream<T>) {
        let backing = match ExecutionBacking::require() {
            Ok(backing) => backing,
            Err(e) => return downstream.error(e),
        };
        let pool = &backing.runtime().blocking;
        if pool.is_shutdown() {
            return downstream.error(ExecError::RuntimeShutdown);
        }

        let handle = backing.open_stream();
        let work = Arc::clone(&self.work);
        let exec = Arc::clone(&backing);
        let task = move || {
            let result = {
                let _binding = ThreadBinding::enter(ThreadRole::Blocking, Some(exec));
                match panic::catch_unwind(AssertUnwindSafe(|| work())) {
                    Ok(result) => result,
                    Err(payload) => Err(ExecError::Panicked(panic_message(payload.as_ref()))),
                }
            };
            handle.complete_with(move || {
                downstream.from_result(result);
                Ok(())
            });
        };

        // A rejected task is dropped with its handle and downstream, which
        // closes the stream and fails the downstream.
        if let Err(e) = pool.submit(Box::new(task)) {
            kerror!("could not hand work to the blocking pool: {}", e);
        }
    }
}
