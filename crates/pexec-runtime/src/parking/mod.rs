//! Compute worker parking
//!
//! Each compute worker owns one parker. The worker parks when its run
//! queue is empty; anything that schedules an execution drain on that
//! worker calls `unpark()`.
//!
//! An `unpark()` that lands before the worker parks is remembered, so the
//! next `park()` returns immediately. Park timeouts bound the damage of
//! any wake that is lost anyway.

use std::time::Duration;

/// Platform-specific parking primitive for a single worker
pub trait WorkerParking: Send + Sync {
    /// Park the calling worker until unparked or timeout
    ///
    /// Returns `true` if a wake was consumed, `false` on timeout or a
    /// spurious return. Callers re-check for work either way.
    fn park(&self, timeout: Option<Duration>) -> bool;

    /// Wake the parked worker, or make its next `park()` return at once
    fn unpark(&self);
}

// Platform-specific implementations
cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        pub(crate) mod futex_linux;
        pub use futex_linux::FutexParking as PlatformParking;
    } else {
        mod fallback;
        pub use fallback::FallbackParking as PlatformParking;
    }
}

/// Create a new platform-appropriate parking instance
pub fn new_parking() -> Box<dyn WorkerParking> {
    Box::new(PlatformParking::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_park_timeout() {
        let parking = new_parking();
        let start = Instant::now();
        let woken = parking.park(Some(Duration::from_millis(50)));

        assert!(!woken);
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_unpark_before_park_is_remembered() {
        let parking = new_parking();
        parking.unpark();

        let start = Instant::now();
        assert!(parking.park(Some(Duration::from_secs(5))));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_unpark_wakes_parked_thread() {
        let parking = Arc::new(PlatformParking::new());
        let parking2 = Arc::clone(&parking);

        let handle = thread::spawn(move || parking2.park(Some(Duration::from_secs(10))));

        thread::sleep(Duration::from_millis(50));
        parking.unpark();

        let start = Instant::now();
        assert!(handle.join().unwrap());
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
