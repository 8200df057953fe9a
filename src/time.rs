//! Monotonic time injection.
//!
//! The session engine reads time exactly once per tick through the
//! [`Clock`] trait. Production devices use [`SystemClock`]
//! (`std::time::Instant` under the hood); tests and simulators drive the
//! engine deterministically with [`ManualClock`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Source of monotonic seconds. One-second resolution is all the session
/// engine needs: every protocol timeout is specified in whole seconds.
pub trait Clock: Send + Sync {
    /// Seconds elapsed since an arbitrary fixed origin. Never decreases.
    fn monotonic_secs(&self) -> u64;
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn monotonic_secs(&self) -> u64 {
        (**self).monotonic_secs()
    }
}

/// Wall-independent clock backed by [`Instant`].
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn monotonic_secs(&self) -> u64 {
        self.start.elapsed().as_secs()
    }
}

/// Hand-driven clock for tests and host-side simulation.
///
/// Shared freely: `advance` uses atomics, so a test can hold the clock on
/// one side and the device on the other.
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: AtomicU64::new(0),
        }
    }

    /// Move time forward by `secs`.
    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn monotonic_secs(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
