//! Thread-local role and execution binding
//!
//! Every runtime thread records its [`ThreadRole`] and the execution it
//! is currently serving. Compute workers hold the compute role for their
//! whole life and bind an execution for the length of each drain.
//! Blocking threads take the blocking role and the submitting execution
//! for the length of one task.
//!
//! Bindings are scoped: [`ThreadBinding::enter`] returns a guard that
//! restores the previous role and execution when dropped.

use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::sync::Arc;

use pexec_core::{kprint, ExecError, ExecResult, ThreadRole};

use crate::backing::ExecutionBacking;

thread_local! {
    static ROLE: Cell<ThreadRole> = const { Cell::new(ThreadRole::None) };

    static EXECUTION: RefCell<Option<Arc<ExecutionBacking>>> = const { RefCell::new(None) };
}

/// Namespace for the calling thread's binding
pub struct ThreadBinding;

impl ThreadBinding {
    /// Role of the calling thread
    #[inline]
    pub fn role() -> ThreadRole {
        ROLE.with(|cell| cell.get())
    }

    #[inline]
    pub fn is_compute() -> bool {
        Self::role().is_compute()
    }

    #[inline]
    pub fn is_blocking() -> bool {
        Self::role().is_blocking()
    }

    /// Fail unless the calling thread is a compute thread
    pub fn require_compute_thread(message: &'static str) -> ExecResult<()> {
        Self::require(ThreadRole::Compute, message)
    }

    /// Fail unless the calling thread is a blocking thread
    pub fn require_blocking_thread(message: &'static str) -> ExecResult<()> {
        Self::require(ThreadRole::Blocking, message)
    }

    fn require(required: ThreadRole, message: &'static str) -> ExecResult<()> {
        let actual = Self::role();
        if actual == required {
            Ok(())
        } else {
            Err(ExecError::WrongThreadRole { required, actual, message })
        }
    }

    /// Execution bound to the calling thread, if any
    pub(crate) fn execution() -> Option<Arc<ExecutionBacking>> {
        EXECUTION.with(|cell| cell.borrow().clone())
    }

    /// Whether the calling thread is serving exactly this execution
    pub(crate) fn is_serving(backing: &ExecutionBacking) -> bool {
        EXECUTION.with(|cell| {
            cell.borrow()
                .as_deref()
                .is_some_and(|current| std::ptr::eq(current, backing))
        })
    }

    /// Bind `role` and `execution` until the guard drops
    pub(crate) fn enter(role: ThreadRole, execution: Option<Arc<ExecutionBacking>>) -> BindingGuard {
        let exec_id = execution.as_ref().map_or(0, |b| b.id().as_u64());
        let prev_role = ROLE.with(|cell| cell.replace(role));
        let prev_execution = EXECUTION.with(|cell| cell.replace(execution));
        kprint::set_execution_id(exec_id);

        BindingGuard {
            prev_role,
            prev_execution,
            _not_send: PhantomData,
        }
    }
}

/// Restores the previous binding on drop
///
/// Not `Send`: it must be dropped on the thread that created it.
#[must_use = "the binding is undone as soon as the guard drops"]
pub(crate) struct BindingGuard {
    prev_role: ThreadRole,
    prev_execution: Option<Arc<ExecutionBacking>>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for BindingGuard {
    fn drop(&mut self) {
        let prev_execution = self.prev_execution.take();
        let exec_id = prev_execution.as_ref().map_or(0, |b| b.id().as_u64());

        ROLE.with(|cell| cell.set(self.prev_role));
        // Drop the replaced Arc outside the RefCell borrow: releasing the
        // last reference may run downstream sinks that look at the binding.
        let replaced = EXECUTION.with(|cell| cell.replace(prev_execution));
        kprint::set_execution_id(exec_id);
        drop(replaced);
    }
}
