//! Execution identifier type

use core::fmt;

/// Unique identifier for one logical execution
///
/// Ids are handed out sequentially by the runtime and never reused.
/// Zero is reserved as a sentinel for "no execution".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ExecutionId(u64);

impl ExecutionId {
    /// Sentinel value indicating no execution
    pub const NONE: ExecutionId = ExecutionId(0);

    /// Create a new ExecutionId from a raw value
    #[inline]
    pub const fn new(id: u64) -> Self {
        ExecutionId(id)
    }

    /// Get the raw u64 value
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Convert to Option
    #[inline]
    pub const fn to_option(self) -> Option<ExecutionId> {
        if self.is_none() {
            None
        } else {
            Some(self)
        }
    }
}

impl From<u64> for ExecutionId {
    #[inline]
    fn from(id: u64) -> Self {
        ExecutionId(id)
    }
}

impl fmt::Debug for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "ExecutionId(NONE)")
        } else {
            write!(f, "ExecutionId({})", self.0)
        }
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "e-")
        } else {
            write!(f, "e{}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_sentinel() {
        assert!(ExecutionId::NONE.is_none());
        assert_eq!(ExecutionId::NONE.to_option(), None);
        assert_eq!(ExecutionId::new(7).to_option(), Some(ExecutionId::new(7)));
    }

    #[test]
    fn test_display() {
        assert_eq!(ExecutionId::new(3).to_string(), "e3");
        assert_eq!(ExecutionId::NONE.to_string(), "e-");
        assert_eq!(format!("{:?}", ExecutionId::new(3)), "ExecutionId(3)");
    }
}
