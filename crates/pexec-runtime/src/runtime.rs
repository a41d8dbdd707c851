//! Runtime: owns the compute and blocking pools and starts executions

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use pexec_core::{kdebug, kerror, kinfo, kprint};
use pexec_core::{ExecError, ExecResult, ExecutionId, ThreadRole};

use crate::backing::{CompleteHandler, ErrorHandler, ExecutionBacking, Job};
use crate::binding::ThreadBinding;
use crate::blocking::BlockingPool;
use crate::config::ExecConfig;
use crate::promise::Promise;
use crate::worker::ComputePool;

/// State shared by the runtime and every execution it started
pub(crate) struct RuntimeShared {
    pub(crate) config: ExecConfig,
    pub(crate) compute: ComputePool,
    pub(crate) blocking: BlockingPool,
    next_worker: AtomicUsize,
    next_execution: AtomicU64,
}

/// Promise executor runtime
///
/// Dropping the runtime shuts it down.
pub struct Runtime {
    shared: Arc<RuntimeShared>,
    shut_down: AtomicBool,
}

impl Runtime {
    /// Validate `config` and start both pools
    pub fn new(config: ExecConfig) -> ExecResult<Self> {
        kprint::init();
        config.validate()?;
        if config.debug_logging {
            config.print();
        }

        let shared = Arc::new(RuntimeShared {
            compute: ComputePool::new(
                config.compute_threads,
                config.idle_spins,
                config.park_timeout,
                config.debug_logging,
            ),
            blocking: BlockingPool::new(
                config.max_blocking_threads,
                config.blocking_keep_alive,
                config.debug_logging,
            ),
            next_worker: AtomicUsize::new(0),
            next_execution: AtomicU64::new(1),
            config,
        });

        let runtime = Self {
            shared,
            shut_down: AtomicBool::new(false),
        };
        // A partial start is torn down by Drop.
        runtime.shared.compute.start()?;

        kinfo!(
            "runtime started: {} compute threads, up to {} blocking threads",
            runtime.shared.config.compute_threads,
            runtime.shared.config.max_blocking_threads
        );
        Ok(runtime)
    }

    /// Runtime with [`ExecConfig::from_env`]
    pub fn from_env() -> ExecResult<Self> {
        Self::new(ExecConfig::from_env())
    }

    pub fn config(&self) -> &ExecConfig {
        &self.shared.config
    }

    /// Start an execution running `entry` with default handlers
    pub fn exec<F>(&self, entry: F) -> ExecResult<ExecHandle>
    where
        F: FnOnce() -> ExecResult<()> + Send + 'static,
    {
        self.exec_spec(ExecSpec::new(entry))
    }

    /// Start an execution
    ///
    /// The entry runs as the first job on a compute thread chosen round
    /// robin. The execution finishes once its queue is empty and no
    /// streams are open.
    pub fn exec_spec(&self, spec: ExecSpec) -> ExecResult<ExecHandle> {
        if self.is_shutdown() {
            return Err(ExecError::RuntimeShutdown);
        }

        let id = ExecutionId::new(self.shared.next_execution.fetch_add(1, Ordering::Relaxed));
        let worker = self.shared.next_worker.fetch_add(1, Ordering::Relaxed) % self.shared.compute.num_workers();
        let ExecSpec { entry, on_error, on_complete } = spec;

        let backing = ExecutionBacking::new(id, worker, Arc::clone(&self.shared), on_error, on_complete);
        kdebug!("starting execution {} on compute worker {}", id, backing.worker());
        backing.enqueue(entry);
        Ok(ExecHandle { backing })
    }

    /// Run an execution that produces a promise and wait for its value
    ///
    /// `f` runs on a compute thread. Its promise is consumed with `then`;
    /// the first error the execution reports is returned. Must not be
    /// called from a compute thread.
    pub fn block_on<T, F>(&self, f: F) -> ExecResult<Option<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> ExecResult<Promise<T>> + Send + 'static,
    {
        let slot: Arc<Mutex<Option<ExecResult<Option<T>>>>> = Arc::new(Mutex::new(None));
        let on_value = Arc::clone(&slot);
        let on_error = Arc::clone(&slot);

        let spec = ExecSpec::new(move || {
            f()?.then(move |value| {
                *on_value.lock().unwrap_or_else(PoisonError::into_inner) = Some(Ok(Some(value)));
                Ok(())
            })
        })
        .on_error(move |e| {
            let mut slot = on_error.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                *slot = Some(Err(e));
            }
        });

        self.exec_spec(spec)?.join()?;
        let result = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        result.unwrap_or(Ok(None))
    }

    pub fn is_shutdown(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Stop both pools and join their threads
    ///
    /// Executions with pending work are abandoned: their error handler
    /// gets [`ExecError::RuntimeShutdown`], joiners are released, and a
    /// `block()` still waiting fails with the same error. Idempotent.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        kdebug!("runtime shutting down");
        self.shared.compute.shutdown();
        self.shared.compute.join();
        self.shared.blocking.shutdown();
        kdebug!("runtime stopped");
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("compute_threads", &self.shared.compute.num_workers())
            .field("blocking_threads", &self.shared.blocking.thread_count())
            .field("shut_down", &self.is_shutdown())
            .finish()
    }
}

/// How to start an execution
pub struct ExecSpec {
    entry: Job,
    on_error: ErrorHandler,
    on_complete: Option<CompleteHandler>,
}

impl ExecSpec {
    pub fn new<F>(entry: F) -> Self
    where
        F: FnOnce() -> ExecResult<()> + Send + 'static,
    {
        Self {
            entry: Box::new(entry),
            on_error: Box::new(|e| kerror!("unhandled execution error: {}", e)),
            on_complete: None,
        }
    }

    /// Receive every error the execution reports
    ///
    /// Replaces the default handler, which logs the error.
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: FnMut(ExecError) + Send + 'static,
    {
        self.on_error = Box::new(handler);
        self
    }

    /// Run once when the execution finishes
    pub fn on_complete<F>(mut self, handler: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_complete = Some(Box::new(handler));
        self
    }
}

impl std::fmt::Debug for ExecSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecSpec")
            .field("on_complete", &self.on_complete.is_some())
            .finish_non_exhaustive()
    }
}

const JOIN_ON_COMPUTE: &str =
    "ExecHandle::join() would stall a compute thread (chain with Promise::then() instead)";

/// Handle to a started execution
#[derive(Debug, Clone)]
pub struct ExecHandle {
    backing: Arc<ExecutionBacking>,
}

impl ExecHandle {
    pub fn id(&self) -> ExecutionId {
        self.backing.id()
    }

    pub fn is_finished(&self) -> bool {
        self.backing.is_finished()
    }

    /// Wait until the execution finishes
    ///
    /// Fails at once on a compute thread.
    pub fn join(&self) -> ExecResult<()> {
        Self::check_may_wait()?;
        self.backing.wait_finished();
        Ok(())
    }

    /// Like [`join`](Self::join), giving up after `timeout`
    ///
    /// Returns whether the execution finished in time.
    pub fn join_timeout(&self, timeout: Duration) -> ExecResult<bool> {
        Self::check_may_wait()?;
        Ok(self.backing.wait_finished_timeout(timeout))
    }

    fn check_may_wait() -> ExecResult<()> {
        let actual = ThreadBinding::role();
        if !actual.may_block() {
            return Err(ExecError::WrongThreadRole {
                required: ThreadRole::Blocking,
                actual,
                message: JOIN_ON_COMPUTE,
            });
        }
        Ok(())
    }
}
