//! Library defaults for [`ExecConfig`](super::ExecConfig)

use pexec_core::constants::{DEFAULT_MAX_BLOCKING_THREADS, MAX_COMPUTE_THREADS};

/// One compute worker per CPU, capped
pub fn compute_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .min(MAX_COMPUTE_THREADS)
}

pub const MAX_BLOCKING_THREADS: usize = DEFAULT_MAX_BLOCKING_THREADS;

/// Idle blocking threads retire after this long
pub const BLOCKING_KEEP_ALIVE_MS: u64 = 60_000;

/// Spins before an idle compute worker parks
pub const IDLE_SPINS: u32 = 10;

pub const PARK_TIMEOUT_MS: u64 = 100;

pub const DEBUG_LOGGING: bool = false;
