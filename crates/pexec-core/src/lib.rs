//! # pexec-core
//!
//! Core types for the pexec promise executor.
//!
//! This crate is platform-agnostic and knows nothing about threads or
//! queues. The scheduler, the thread binding and the blocking bridge
//! live in `pexec-runtime`.
//!
//! ## Modules
//!
//! - `id` - Execution identifier type
//! - `role` - Thread role enum (compute / blocking)
//! - `outcome` - Immutable success / failure / empty outcome
//! - `stream` - Upstream/Downstream protocol
//! - `error` - Error types
//! - `kprint` - Kernel-style debug printing macros
//! - `env` - Environment variable utilities

#![allow(dead_code)]

pub mod id;
pub mod role;
pub mod outcome;
pub mod stream;
pub mod error;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use id::ExecutionId;
pub use role::ThreadRole;
pub use outcome::Outcome;
pub use stream::{Downstream, Upstream};
pub use error::{ConfigError, ExecError, ExecResult, WorkerError};
pub use env::{env_get, env_get_bool, env_get_millis, env_get_opt, env_get_str, env_is_set};

/// Runtime-wide constants
pub mod constants {
    /// Maximum compute workers (OS threads running event loops)
    pub const MAX_COMPUTE_THREADS: usize = 64;

    /// Default ceiling for the cached blocking pool
    pub const DEFAULT_MAX_BLOCKING_THREADS: usize = 512;

    /// No worker sentinel value
    pub const WORKER_NONE: usize = usize::MAX;
}
