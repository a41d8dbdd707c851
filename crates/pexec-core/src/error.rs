//! Error types for the pexec executor
//!
//! Errors fall into three groups:
//!
//! - **domain** errors are the payload of a failed [`Outcome`](crate::Outcome).
//!   They come from user continuations or from the upstream operation and
//!   are the only errors `retry` reacts to.
//! - **usage** errors flag programmer mistakes: wrong thread role, no
//!   current execution, runtime already shut down. Never retried.
//! - **internal** errors flag a broken protocol invariant inside the
//!   executor itself.

use core::fmt;
use std::sync::Arc;

use crate::role::ThreadRole;

/// Result type for executor operations
pub type ExecResult<T> = Result<T, ExecError>;

/// Errors that can occur in executor operations
#[derive(Debug, Clone)]
pub enum ExecError {
    /// Domain failure carrying an arbitrary error value
    Failed(Arc<dyn std::error::Error + Send + Sync>),

    /// Domain failure carrying only a message
    Message(String),

    /// A job or continuation panicked; the payload message is kept
    Panicked(String),

    /// Operation was attempted on a thread with the wrong role
    WrongThreadRole {
        required: ThreadRole,
        actual: ThreadRole,
        message: &'static str,
    },

    /// No execution is bound to the calling thread
    NoExecution,

    /// The runtime has been shut down
    RuntimeShutdown,

    /// Upstream transformer failed while building the new upstream
    Transform(Box<ExecError>),

    /// Invalid runtime configuration
    Config(ConfigError),

    /// Worker thread error
    Worker(WorkerError),

    /// Protocol invariant violated inside the executor
    Internal(String),
}

impl ExecError {
    /// Build a domain error from a message
    pub fn msg(message: impl Into<String>) -> Self {
        ExecError::Message(message.into())
    }

    /// Build a domain error wrapping any error value
    pub fn failed<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ExecError::Failed(Arc::new(err))
    }

    /// Domain errors are the ones carried by a failed outcome
    #[inline]
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            ExecError::Failed(_) | ExecError::Message(_) | ExecError::Panicked(_)
        )
    }

    /// Usage errors are programmer mistakes and always fail fast
    #[inline]
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            ExecError::WrongThreadRole { .. } | ExecError::NoExecution | ExecError::RuntimeShutdown
        )
    }

    /// Whether `retry` may try again after this error
    #[inline]
    pub fn is_retryable(&self) -> bool {
        self.is_domain()
    }
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::Failed(e) => write!(f, "{}", e),
            ExecError::Message(m) => write!(f, "{}", m),
            ExecError::Panicked(m) => write!(f, "panicked: {}", m),
            ExecError::WrongThreadRole { required, actual, message } => write!(
                f,
                "{} (thread role is {}, requires {})",
                message, actual, required
            ),
            ExecError::NoExecution => write!(f, "no execution bound to the current thread"),
            ExecError::RuntimeShutdown => write!(f, "runtime has been shut down"),
            ExecError::Transform(e) => write!(f, "upstream transform failed: {}", e),
            ExecError::Config(e) => write!(f, "config error: {}", e),
            ExecError::Worker(e) => write!(f, "worker error: {}", e),
            ExecError::Internal(m) => write!(f, "internal error: {}", m),
        }
    }
}

impl std::error::Error for ExecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExecError::Failed(e) => Some(e.as_ref()),
            ExecError::Transform(e) => Some(e.as_ref()),
            ExecError::Config(e) => Some(e),
            ExecError::Worker(e) => Some(e),
            _ => None,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for ExecError {
    fn from(e: ConfigError) -> Self {
        ExecError::Config(e)
    }
}

/// Worker thread related errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// Failed to spawn a worker thread
    SpawnFailed(String),

    /// Worker thread panicked
    Panicked,
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerError::SpawnFailed(why) => write!(f, "failed to spawn worker thread: {}", why),
            WorkerError::Panicked => write!(f, "worker thread panicked"),
        }
    }
}

impl std::error::Error for WorkerError {}

impl From<WorkerError> for ExecError {
    fn from(e: WorkerError) -> Self {
        ExecError::Worker(e)
    }
}
