//! Environment variable utilities
//!
//! Typed lookups with defaults, used by `ExecConfig::from_env()` and the
//! logging setup.
//!
//! ```ignore
//! use pexec_core::env::{env_get, env_get_bool, env_get_millis};
//!
//! let threads: usize = env_get("PEXEC_COMPUTE_THREADS", 4);
//! let keep_alive = env_get_millis("PEXEC_BLOCKING_KEEP_ALIVE_MS", 60_000);
//! let debug = env_get_bool("PEXEC_DEBUG", false);
//! ```

use std::str::FromStr;
use std::time::Duration;

/// Parse `key` as `T`, falling back to `default` when unset or unparsable
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Boolean flag: "1", "true", "yes", "on" (any case) are true,
/// any other value is false, unset yields `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// `Some(T)` only when the variable is set and parses
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Millisecond count as a `Duration`
#[inline]
pub fn env_get_millis(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_get(key, default_ms))
}

#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[inline]
pub fn env_is_set(key: &str) -> bool {
    std::env::var(key).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test uses its own variable names; the process env is shared
    // across the test harness threads.

    #[test]
    fn test_unset_returns_default() {
        let val: usize = env_get("__PEXEC_TEST_UNSET__", 42);
        assert_eq!(val, 42);
        assert!(env_get_bool("__PEXEC_TEST_UNSET__", true));
        assert!(env_get_opt::<u64>("__PEXEC_TEST_UNSET__").is_none());
        assert_eq!(env_get_str("__PEXEC_TEST_UNSET__", "hello"), "hello");
        assert!(!env_is_set("__PEXEC_TEST_UNSET__"));
    }

    #[test]
    fn test_parse_and_trim() {
        std::env::set_var("__PEXEC_TEST_NUM__", " 123 ");
        let val: usize = env_get("__PEXEC_TEST_NUM__", 0);
        assert_eq!(val, 123);
        std::env::remove_var("__PEXEC_TEST_NUM__");
    }

    #[test]
    fn test_invalid_parse_falls_back() {
        std::env::set_var("__PEXEC_TEST_INVALID__", "lots");
        let val: usize = env_get("__PEXEC_TEST_INVALID__", 99);
        assert_eq!(val, 99);
        std::env::remove_var("__PEXEC_TEST_INVALID__");
    }

    #[test]
    fn test_bool_variants() {
        for (raw, expected) in [("1", true), ("TRUE", true), ("on", true), ("0", false), ("nope", false)] {
            std::env::set_var("__PEXEC_TEST_BOOL__", raw);
            assert_eq!(env_get_bool("__PEXEC_TEST_BOOL__", !expected), expected, "value {raw}");
        }
        std::env::remove_var("__PEXEC_TEST_BOOL__");
    }

    #[test]
    fn test_millis() {
        std::env::set_var("__PEXEC_TEST_MS__", "250");
        assert_eq!(env_get_millis("__PEXEC_TEST_MS__", 1), Duration::from_millis(250));
        std::env::remove_var("__PEXEC_TEST_MS__");
        assert_eq!(env_get_millis("__PEXEC_TEST_MS__", 5), Duration::from_millis(5));
    }
}
