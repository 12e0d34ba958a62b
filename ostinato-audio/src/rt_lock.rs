//! Mutex with a bounded acquisition path for the audio thread.
//!
//! The audio callback never blocks: [`RtMutex::try_lock_rt`] makes at most
//! [`RT_SPIN_LIMIT`] attempts and then gives up, and the callback treats the
//! miss as a glitch for that buffer. Control threads use [`RtMutex::lock`],
//! which retries `try_lock` up to [`CONTROL_SPIN_LIMIT`] times (spinning, then
//! yielding) before falling back to a blocking lock. Locked sections on both
//! sides are short and never nest, so the audio thread's attempts succeed
//! within one or two retries under normal contention.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, TryLockError};

/// Attempts the audio thread makes before skipping the locked section.
pub const RT_SPIN_LIMIT: u32 = 256;

/// Attempts a control thread makes before blocking.
pub const CONTROL_SPIN_LIMIT: u32 = 4096;

/// Spin attempts before a control thread starts yielding its time slice.
const SPINS_BEFORE_YIELD: u32 = 64;

pub struct RtMutex<T> {
    inner: Mutex<T>,
    rt_misses: AtomicU64,
}

impl<T> RtMutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
            rt_misses: AtomicU64::new(0),
        }
    }

    /// Audio-thread acquisition. Returns `None` after [`RT_SPIN_LIMIT`] failed
    /// attempts and counts the miss.
    pub fn try_lock_rt(&self) -> Option<MutexGuard<'_, T>> {
        for _ in 0..RT_SPIN_LIMIT {
            match self.inner.try_lock() {
                Ok(guard) => return Some(guard),
                Err(TryLockError::Poisoned(e)) => return Some(e.into_inner()),
                Err(TryLockError::WouldBlock) => std::hint::spin_loop(),
            }
        }
        self.rt_misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Control-thread acquisition. Always succeeds.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        for attempt in 0..CONTROL_SPIN_LIMIT {
            match self.inner.try_lock() {
                Ok(guard) => return guard,
                Err(TryLockError::Poisoned(e)) => return e.into_inner(),
                Err(TryLockError::WouldBlock) => {
                    if attempt < SPINS_BEFORE_YIELD {
                        std::hint::spin_loop();
                    } else {
                        std::thread::yield_now();
                    }
                }
            }
        }
        log::debug!(target: "rt_lock", "contended lock, falling back to blocking acquire");
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of times the audio thread gave up on this lock.
    pub fn rt_misses(&self) -> u64 {
        self.rt_misses.load(Ordering::Relaxed)
    }
}

impl<T: Default> Default for RtMutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
