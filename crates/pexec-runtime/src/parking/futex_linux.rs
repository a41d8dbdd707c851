//! Linux futex-based worker parking
//!
//! Futex word semantics:
//! - 0 = no wake pending
//! - 1 = wake pending
//!
//! `unpark()` always publishes the wake before issuing FUTEX_WAKE, and
//! `park()` bumps the parked flag before reading the word. With both
//! sides SeqCst, either the parker sees the pending wake or the waker
//! sees the parker.

use super::WorkerParking;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

pub struct FutexParking {
    /// Futex word: 0 = sleep, 1 = wake pending
    futex: AtomicU32,

    parked: AtomicBool,
}

impl FutexParking {
    pub fn new() -> Self {
        Self {
            futex: AtomicU32::new(0),
            parked: AtomicBool::new(false),
        }
    }
}

impl Default for FutexParking {
    fn default() -> Self {
        Self::new()
    }
}

/// FUTEX_WAIT while `*word == expected`; returns true if woken by FUTEX_WAKE
pub(crate) fn futex_wait(word: &AtomicU32, expected: u32, timeout: Option<Duration>) -> bool {
    let timespec = timeout.map(|d| libc::timespec {
        tv_sec: d.as_secs() as libc::time_t,
        tv_nsec: d.subsec_nanos() as libc::c_long,
    });
    let timespec_ptr = match &timespec {
        Some(ts) => ts as *const libc::timespec,
        None => std::ptr::null(),
    };

    let result = unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
            expected,
            timespec_ptr,
            std::ptr::null::<u32>(),
            0u32,
        )
    };

    // ETIMEDOUT, EAGAIN (word already changed) and EINTR all count as
    // "not woken"; callers re-check their condition anyway.
    result == 0
}

/// FUTEX_WAKE up to `count` waiters
pub(crate) fn futex_wake(word: &AtomicU32, count: i32) {
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
            count,
            std::ptr::null::<libc::timespec>(),
            std::ptr::null::<u32>(),
            0u32,
        );
    }
}

impl WorkerParking for FutexParking {
    fn park(&self, timeout: Option<Duration>) -> bool {
        self.parked.store(true, Ordering::SeqCst);

        // Consume a wake that arrived before we got here
        if self.futex.swap(0, Ordering::SeqCst) != 0 {
            self.parked.store(false, Ordering::SeqCst);
            return true;
        }

        let woken = futex_wait(&self.futex, 0, timeout);

        self.parked.store(false, Ordering::SeqCst);
        let pending = self.futex.swap(0, Ordering::SeqCst) != 0;
        woken || pending
    }

    fn unpark(&self) {
        self.futex.store(1, Ordering::SeqCst);
        if self.parked.load(Ordering::SeqCst) {
            futex_wake(&self.futex, 1);
        }
    }
}
