//! # pexec-runtime
//!
//! Runtime for the pexec promise executor.
//!
//! This crate provides:
//! - Compute worker pool (one event loop drain at a time per execution)
//! - Cached blocking thread pool
//! - Per-execution event loops ([`ExecutionBacking`])
//! - Thread role binding ([`ThreadBinding`])
//! - [`Promise`] with `then`, `block`, `transform`, `map` and `retry`
//! - Futex-backed parking and latches on Linux, condvar elsewhere

pub mod config;
pub mod parking;
pub mod latch;
pub mod binding;
pub mod backing;
pub mod worker;
pub mod blocking;
pub mod promise;
pub mod runtime;

// Re-exports
pub use config::ExecConfig;
pub use parking::{new_parking, WorkerParking};
pub use latch::Latch;
pub use binding::ThreadBinding;
pub use backing::{ExecutionBacking, StreamHandle};
pub use worker::current_worker_id;
pub use blocking::blocking;
pub use promise::Promise;
pub use runtime::{ExecHandle, ExecSpec, Runtime};
