//! One-shot latch
//!
//! The blocking bridge waits on a latch that the promise's downstream
//! releases. Releasing is idempotent; waiting after release returns at
//! once. Waiting is only legitimate off compute threads, which callers
//! check before they get here.

use std::time::{Duration, Instant};

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        use crate::parking::futex_linux::{futex_wait, futex_wake};
        use std::sync::atomic::{AtomicU32, Ordering};

        /// Futex-backed one-shot latch
        pub struct Latch {
            /// 0 = closed, 1 = released
            word: AtomicU32,
        }

        impl Latch {
            pub const fn new() -> Self {
                Self { word: AtomicU32::new(0) }
            }

            pub fn release(&self) {
                if self.word.swap(1, Ordering::Release) == 0 {
                    futex_wake(&self.word, i32::MAX);
                }
            }

            #[inline]
            pub fn is_released(&self) -> bool {
                self.word.load(Ordering::Acquire) != 0
            }

            pub fn wait(&self) {
                while !self.is_released() {
                    futex_wait(&self.word, 0, None);
                }
            }

            /// Returns whether the latch was released before `timeout`
            pub fn wait_timeout(&self, timeout: Duration) -> bool {
                let deadline = Instant::now() + timeout;
                while !self.is_released() {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    futex_wait(&self.word, 0, Some(deadline - now));
                }
                true
            }
        }
    } else {
        use std::sync::{Condvar, Mutex, PoisonError};

        /// Condvar-backed one-shot latch
        pub struct Latch {
            released: Mutex<bool>,
            condvar: Condvar,
        }

        impl Latch {
            pub const fn new() -> Self {
                Self {
                    released: Mutex::new(false),
                    condvar: Condvar::new(),
                }
            }

            pub fn release(&self) {
                let mut released = self.released.lock().unwrap_or_else(PoisonError::into_inner);
                if !*released {
                    *released = true;
                    self.condvar.notify_all();
                }
            }

            pub fn is_released(&self) -> bool {
                *self.released.lock().unwrap_or_else(PoisonError::into_inner)
            }

            pub fn wait(&self) {
                let mut released = self.released.lock().unwrap_or_else(PoisonError::into_inner);
                while !*released {
                    released = self.condvar.wait(released).unwrap_or_else(PoisonError::into_inner);
                }
            }

            pub fn wait_timeout(&self, timeout: Duration) -> bool {
                let deadline = Instant::now() + timeout;
                let mut released = self.released.lock().unwrap_or_else(PoisonError::into_inner);
                while !*released {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    released = self
                        .condvar
                        .wait_timeout(released, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
                true
            }
        }
    }
}

impl Default for Latch {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Latch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Latch")
            .field("released", &self.is_released())
            .finish()
    }
}
