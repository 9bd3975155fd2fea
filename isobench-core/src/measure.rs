//! Batch Timing
//!
//! Repetitions are timed as a whole batch of calls against the monotonic
//! clock. Per-call figures are derived afterwards, so the clock is read twice
//! per repetition regardless of the batch size.

use std::time::{Duration, Instant};

/// Timer for measuring one batch of calls
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer
    #[inline(always)]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Elapsed time since the timer started
    #[inline(always)]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return elapsed nanoseconds (saturating)
    #[inline(always)]
    pub fn stop(&self) -> u64 {
        u64::try_from(self.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}
