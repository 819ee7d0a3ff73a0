//! Time source abstraction.
//!
//! The lock's retry loop and the queue's failure backoff both sleep between
//! attempts. Routing `now` and `sleep` through a trait lets tests drive
//! elapsed time deterministically instead of waiting on the wall clock.

use std::time::{Duration, Instant};

/// A source of monotonic time and a way to wait on it.
pub trait Clock: Send + Sync {
    /// Current monotonic instant.
    fn now(&self) -> Instant;

    /// Block the calling thread for `dur`.
    fn sleep(&self, dur: Duration);
}

/// The real wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, dur: Duration) {
        std::thread::sleep(dur);
    }
}
