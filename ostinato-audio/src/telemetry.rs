//! Audio callback telemetry.
//!
//! Collected on the audio thread without allocating: callback durations go
//! into a fixed ring, glitches into plain counters. A control thread asks for
//! a [`TelemetrySummary`] now and then and logs it.

use std::time::Duration;

const WINDOW: usize = 256;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetrySummary {
    pub avg_us: u32,
    pub max_us: u32,
    pub p95_us: u32,
    /// Callbacks that took longer than the buffer lasts. Cumulative.
    pub overruns: u64,
    /// Buffers rendered as silence because a lock could not be taken. Cumulative.
    pub lock_misses: u64,
}

pub struct AudioTelemetry {
    durations_us: [u32; WINDOW],
    idx: usize,
    filled: usize,
    max_us: u32,
    overruns: u64,
    lock_misses: u64,
}

impl Default for AudioTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioTelemetry {
    pub fn new() -> Self {
        Self {
            durations_us: [0; WINDOW],
            idx: 0,
            filled: 0,
            max_us: 0,
            overruns: 0,
            lock_misses: 0,
        }
    }

    /// Record one callback against the time the buffer represents.
    #[inline]
    pub fn record(&mut self, duration: Duration, budget: Duration) {
        let us = duration.as_micros().min(u32::MAX as u128) as u32;
        self.durations_us[self.idx] = us;
        self.idx = (self.idx + 1) % WINDOW;
        self.filled = (self.filled + 1).min(WINDOW);
        self.max_us = self.max_us.max(us);
        if duration > budget {
            self.overruns += 1;
        }
    }

    #[inline]
    pub fn record_lock_miss(&mut self) {
        self.lock_misses += 1;
    }

    /// Summarize the window and reset the max for the next one.
    pub fn take_summary(&mut self) -> TelemetrySummary {
        if self.filled == 0 {
            return TelemetrySummary {
                lock_misses: self.lock_misses,
                ..TelemetrySummary::default()
            };
        }
        let window = &self.durations_us[..self.filled];
        let sum: u64 = window.iter().map(|&x| x as u64).sum();
        let mut sorted = self.durations_us;
        sorted[..self.filled].sort_unstable();
        let p95_idx = (self.filled * 95 / 100).max(1) - 1;

        let summary = TelemetrySummary {
            avg_us: (sum / self.filled as u64) as u32,
            max_us: self.max_us,
            p95_us: sorted[p95_idx.min(self.filled - 1)],
            overruns: self.overruns,
            lock_misses: self.lock_misses,
        };
        self.max_us = 0;
        summary
    }
}
