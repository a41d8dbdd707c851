//! Compute worker threads
//!
//! Each compute worker is an OS thread that runs the event loops of the
//! executions pinned to it. A worker owns a run queue of executions that
//! asked for a drain and a parker it sleeps on when that queue is empty.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_queue::SegQueue;

use pexec_core::constants::WORKER_NONE;
use pexec_core::kprint::{self, ThreadTag};
use pexec_core::{kdebug, kwarn, ThreadRole, WorkerError};

use crate::backing::ExecutionBacking;
use crate::binding::ThreadBinding;
use crate::parking::{new_parking, WorkerParking};

thread_local! {
    static CURRENT_WORKER_ID: Cell<usize> = const { Cell::new(WORKER_NONE) };
}

/// Index of the compute worker running on this thread, if any
#[inline]
pub fn current_worker_id() -> Option<usize> {
    let id = CURRENT_WORKER_ID.with(|cell| cell.get());
    (id != WORKER_NONE).then_some(id)
}

fn set_current_worker_id(id: usize) {
    CURRENT_WORKER_ID.with(|cell| cell.set(id));
}

/// Per-worker state shared between the worker and its submitters
struct WorkerSlot {
    run_queue: SegQueue<Arc<ExecutionBacking>>,
    parking: Box<dyn WorkerParking>,
}

struct ComputeInner {
    slots: Box<[WorkerSlot]>,
    shutdown: AtomicBool,
    started_count: AtomicUsize,
    idle_spins: u32,
    park_timeout: Duration,
    debug: bool,
}

/// Fixed pool of compute worker threads
pub(crate) struct ComputePool {
    inner: Arc<ComputeInner>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ComputePool {
    pub(crate) fn new(num_workers: usize, idle_spins: u32, park_timeout: Duration, debug: bool) -> Self {
        let slots = (0..num_workers)
            .map(|_| WorkerSlot {
                run_queue: SegQueue::new(),
                parking: new_parking(),
            })
            .collect();

        Self {
            inner: Arc::new(ComputeInner {
                slots,
                shutdown: AtomicBool::new(false),
                started_count: AtomicUsize::new(0),
                idle_spins,
                park_timeout,
                debug,
            }),
            handles: Mutex::new(Vec::with_capacity(num_workers)),
        }
    }

    /// Spawn all worker threads
    pub(crate) fn start(&self) -> Result<(), WorkerError> {
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        for i in 0..self.inner.slots.len() {
            let inner = Arc::clone(&self.inner);
            let handle = thread::Builder::new()
                .name(format!("pexec-compute-{}", i))
                .spawn(move || compute_main_loop(inner, i))
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;
            handles.push(handle);
        }
        Ok(())
    }

    #[inline]
    pub(crate) fn num_workers(&self) -> usize {
        self.inner.slots.len()
    }

    /// Number of workers that have entered their main loop
    pub(crate) fn started_count(&self) -> usize {
        self.inner.started_count.load(Ordering::Acquire)
    }

    /// Queue `backing` for a drain on `worker`
    ///
    /// Returns `false` once the pool is shut down.
    pub(crate) fn submit(&self, worker: usize, backing: Arc<ExecutionBacking>) -> bool {
        if self.is_shutdown() {
            return false;
        }
        let slot = &self.inner.slots[worker];
        slot.run_queue.push(backing);
        slot.parking.unpark();
        true
    }

    #[inline]
    pub(crate) fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Signal shutdown and wake every worker
    pub(crate) fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        for slot in self.inner.slots.iter() {
            slot.parking.unpark();
        }
    }

    /// Wait for all workers to exit
    ///
    /// A worker cannot join itself; called from a compute thread this only
    /// detaches the handles.
    pub(crate) fn join(&self) {
        let handles = std::mem::take(&mut *self.handles.lock().unwrap_or_else(PoisonError::into_inner));
        if current_worker_id().is_some() {
            kwarn!("runtime shut down from a compute thread; not joining compute workers");
            return;
        }
        for handle in handles {
            if handle.join().is_err() {
                kwarn!("compute worker panicked");
            }
        }
    }
}

/// Main worker loop
fn compute_main_loop(inner: Arc<ComputeInner>, worker_id: usize) {
    set_current_worker_id(worker_id);
    kprint::set_thread_tag(ThreadTag::Compute(worker_id));
    let _role = ThreadBinding::enter(ThreadRole::Compute, None);

    inner.started_count.fetch_add(1, Ordering::AcqRel);
    if inner.debug {
        kdebug!("compute worker started");
    }

    let slot = &inner.slots[worker_id];
    let mut idle_spins: u32 = 0;

    loop {
        if inner.shutdown.load(Ordering::Acquire) {
            if inner.debug {
                kdebug!("shutdown signaled, exiting");
            }
            break;
        }

        match slot.run_queue.pop() {
            Some(backing) => {
                idle_spins = 0;
                backing.run_scheduled();
            }
            None => {
                if idle_spins < inner.idle_spins {
                    // Quick spin first to catch fast schedule/drain cycles
                    idle_spins += 1;
                    for _ in 0..32 {
                        std::hint::spin_loop();
                    }
                    thread::yield_now();
                } else {
                    slot.parking.park(Some(inner.park_timeout));
                    idle_spins = 0;
                }
            }
        }
    }

    while let Some(backing) = slot.run_queue.pop() {
        backing.abandon();
    }
    set_current_worker_id(WORKER_NONE);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_worker_id_unset_off_pool() {
        thread::spawn(|| assert_eq!(current_worker_id(), None))
            .join()
            .unwrap();
    }

    #[test]
    fn test_pool_starts_and_stops() {
        let pool = ComputePool::new(2, 1, Duration::from_millis(5), false);
        pool.start().unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while pool.started_count() < 2 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(pool.started_count(), 2);
        assert_eq!(pool.num_workers(), 2);

        pool.shutdown();
        pool.join();
        assert!(pool.is_shutdown());
    }
}
