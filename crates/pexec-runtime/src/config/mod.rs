//! Runtime configuration
//!
//! Library defaults with runtime environment overrides.
//!
//! # Example
//!
//! ```rust,ignore
//! use pexec_runtime::config::ExecConfig;
//!
//! // Defaults with env overrides
//! let config = ExecConfig::from_env();
//!
//! // Or customize programmatically
//! let config = ExecConfig::new()
//!     .compute_threads(2)
//!     .max_blocking_threads(16);
//! ```

pub mod defaults;

use std::time::Duration;

use pexec_core::constants::MAX_COMPUTE_THREADS;
use pexec_core::env::{env_get, env_get_bool, env_get_millis};
use pexec_core::ConfigError;

/// Runtime configuration with builder pattern.
#[derive(Debug, Clone)]
pub struct ExecConfig {
    /// Number of compute (event loop) threads
    pub compute_threads: usize,
    /// Ceiling for the cached blocking pool
    pub max_blocking_threads: usize,
    /// Idle blocking threads retire after this long
    pub blocking_keep_alive: Duration,
    /// Spins before an idle compute worker parks
    pub idle_spins: u32,
    /// Compute worker park timeout
    pub park_timeout: Duration,
    /// Enable debug logging of worker lifecycle
    pub debug_logging: bool,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ExecConfig {
    /// Library defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `PEXEC_COMPUTE_THREADS` - Number of compute threads
    /// - `PEXEC_MAX_BLOCKING_THREADS` - Blocking pool ceiling
    /// - `PEXEC_BLOCKING_KEEP_ALIVE_MS` - Idle blocking thread lifetime
    /// - `PEXEC_IDLE_SPINS` - Spins before parking
    /// - `PEXEC_PARK_TIMEOUT_MS` - Park timeout in milliseconds
    /// - `PEXEC_DEBUG` - Enable debug logging (0/1)
    pub fn from_env() -> Self {
        Self {
            compute_threads: env_get("PEXEC_COMPUTE_THREADS", defaults::compute_threads()),
            max_blocking_threads: env_get(
                "PEXEC_MAX_BLOCKING_THREADS",
                defaults::MAX_BLOCKING_THREADS,
            ),
            blocking_keep_alive: env_get_millis(
                "PEXEC_BLOCKING_KEEP_ALIVE_MS",
                defaults::BLOCKING_KEEP_ALIVE_MS,
            ),
            idle_spins: env_get("PEXEC_IDLE_SPINS", defaults::IDLE_SPINS),
            park_timeout: env_get_millis("PEXEC_PARK_TIMEOUT_MS", defaults::PARK_TIMEOUT_MS),
            debug_logging: env_get_bool("PEXEC_DEBUG", defaults::DEBUG_LOGGING),
        }
    }

    /// Library defaults only, no env override.
    /// Useful for tests.
    pub fn new() -> Self {
        Self {
            compute_threads: defaults::compute_threads(),
            max_blocking_threads: defaults::MAX_BLOCKING_THREADS,
            blocking_keep_alive: Duration::from_millis(defaults::BLOCKING_KEEP_ALIVE_MS),
            idle_spins: defaults::IDLE_SPINS,
            park_timeout: Duration::from_millis(defaults::PARK_TIMEOUT_MS),
            debug_logging: defaults::DEBUG_LOGGING,
        }
    }

    // Builder methods

    pub fn compute_threads(mut self, n: usize) -> Self {
        self.compute_threads = n;
        self
    }

    pub fn max_blocking_threads(mut self, n: usize) -> Self {
        self.max_blocking_threads = n;
        self
    }

    pub fn blocking_keep_alive(mut self, d: Duration) -> Self {
        self.blocking_keep_alive = d;
        self
    }

    pub fn idle_spins(mut self, spins: u32) -> Self {
        self.idle_spins = spins;
        self
    }

    pub fn park_timeout(mut self, d: Duration) -> Self {
        self.park_timeout = d;
        self
    }

    pub fn debug_logging(mut self, enable: bool) -> Self {
        self.debug_logging = enable;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.compute_threads == 0 {
            return Err(ConfigError::InvalidValue("compute_threads must be > 0"));
        }
        if self.compute_threads > MAX_COMPUTE_THREADS {
            return Err(ConfigError::InvalidValue("compute_threads must be <= 64"));
        }
        if self.max_blocking_threads == 0 {
            return Err(ConfigError::InvalidValue("max_blocking_threads must be > 0"));
        }
        if self.park_timeout.is_zero() {
            return Err(ConfigError::InvalidValue("park_timeout must be > 0"));
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        eprintln!("pexec configuration:");
        eprintln!("  compute_threads:        {}", self.compute_threads);
        eprintln!("  max_blocking_threads:   {}", self.max_blocking_threads);
        eprintln!("  blocking_keep_alive:    {:?}", self.blocking_keep_alive);
        eprintln!("  idle_spins:             {}", self.idle_spins);
        eprintln!("  park_timeout:           {:?}", self.park_timeout);
        eprintln!("  debug_logging:          {}", self.debug_logging);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        let config = ExecConfig::new();
        assert!(config.compute_threads >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = ExecConfig::new()
            .compute_threads(2)
            .max_blocking_threads(8)
            .park_timeout(Duration::from_millis(5));

        assert_eq!(config.compute_threads, 2);
        assert_eq!(config.max_blocking_threads, 8);
        assert_eq!(config.park_timeout, Duration::from_millis(5));
    }

    #[test]
    fn test_validation() {
        assert!(ExecConfig::new().compute_threads(0).validate().is_err());
        assert!(ExecConfig::new().compute_threads(1000).validate().is_err());
        assert_eq!(
            ExecConfig::new().max_blocking_threads(0).validate(),
            Err(ConfigError::InvalidValue("max_blocking_threads must be > 0"))
        );
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("PEXEC_MAX_BLOCKING_THREADS", "7");
        let config = ExecConfig::from_env();
        std::env::remove_var("PEXEC_MAX_BLOCKING_THREADS");
        assert_eq!(config.max_blocking_threads, 7);
    }
}
