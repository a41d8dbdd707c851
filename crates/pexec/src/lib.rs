//! # pexec - Promise Executor
//!
//! Promises over a managed execution model.
//!
//! ## Features
//!
//! - **Executions**: each logical unit of work runs as a FIFO event loop
//!   pinned to one compute thread, one job at a time
//! - **Thread roles**: compute threads never block; blocking threads may
//! - **Promises**: `then` on compute threads, `block` on blocking threads,
//!   plus `map`, `transform` and `retry`
//! - **Single error channel**: every failure of an execution reaches its
//!   error handler exactly once
//!
//! ## Quick Start
//!
//! ```ignore
//! use pexec::{blocking, kinfo, ExecConfig, Runtime};
//!
//! fn main() -> pexec::ExecResult<()> {
//!     let runtime = Runtime::new(ExecConfig::from_env())?;
//!
//!     let handle = runtime.exec(|| {
//!         blocking(|| Ok(std::fs::read_to_string("/etc/hostname").map_err(pexec::ExecError::failed)?))
//!             .map(|s| Ok(s.trim().to_string()))
//!             .then(|host| {
//!                 kinfo!("running on {}", host);
//!                 Ok(())
//!             })
//!     })?;
//!
//!     handle.join()
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      User Code                              │
//! │        Runtime::exec(), Promise::then(), blocking()         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Executions (event loops)                    │
//! │      FIFO job queue, open streams, error/complete hooks     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!          ┌───────────────────┴───────────────────┐
//!          ▼                                       ▼
//!    ┌─────────────────┐                   ┌─────────────────┐
//!    │ Compute workers │  ◄── results ──   │  Blocking pool  │
//!    │  (fixed, N)     │  ── blocking() ─► │  (cached)       │
//!    └─────────────────┘                   └─────────────────┘
//! ```

// Re-export core types
pub use pexec_core::{
    Downstream,
    ExecError,
    ExecResult,
    ExecutionId,
    Outcome,
    ThreadRole,
    Upstream,
    ConfigError,
    WorkerError,
};

// Re-export kprint macros for logging
pub use pexec_core::{kprint, kprintln, kerror, kwarn, kinfo, kdebug, ktrace};
pub use pexec_core::kprint::{LogLevel, init as init_logging, set_log_level, set_flush_enabled};

// Re-export env utilities
pub use pexec_core::{env_get, env_get_bool, env_get_millis, env_get_opt, env_get_str, env_is_set};

// Re-export runtime types
pub use pexec_runtime::{
    blocking,
    ExecConfig,
    ExecHandle,
    ExecSpec,
    ExecutionBacking,
    Latch,
    Promise,
    Runtime,
    StreamHandle,
    ThreadBinding,
};
