//! Thread role type

use core::fmt;

/// Role of the current OS thread
///
/// A thread is in at most one role at a time. Compute threads run
/// event loops and may register continuations but must never block.
/// Blocking threads may wait synchronously but must never register
/// continuations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ThreadRole {
    /// Not a runtime thread (e.g. `main`, a test harness thread)
    #[default]
    None = 0,

    /// Event-loop thread: drains execution queues
    Compute = 1,

    /// Blocking-pool thread: may wait on latches
    Blocking = 2,
}

impl ThreadRole {
    #[inline]
    pub const fn is_compute(&self) -> bool {
        matches!(self, ThreadRole::Compute)
    }

    #[inline]
    pub const fn is_blocking(&self) -> bool {
        matches!(self, ThreadRole::Blocking)
    }

    /// Whether this thread may park the OS thread
    #[inline]
    pub const fn may_block(&self) -> bool {
        !self.is_compute()
    }
}

impl From<u8> for ThreadRole {
    fn from(v: u8) -> Self {
        match v {
            1 => ThreadRole::Compute,
            2 => ThreadRole::Blocking,
            _ => ThreadRole::None,
        }
    }
}

impl From<ThreadRole> for u8 {
    fn from(role: ThreadRole) -> u8 {
        role as u8
    }
}

impl fmt::Display for ThreadRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadRole::None => write!(f, "none"),
            ThreadRole::Compute => write!(f, "compute"),
            ThreadRole::Blocking => write!(f, "blocking"),
        }
    }
}
