//! Time Scaling
//!
//! A run may declare that the measured wall time over-counts (or under-counts)
//! the work it is interested in, e.g. a round trip where only one direction
//! matters. The measured batch time is corrected with a multiplicative factor
//! and an additive increment, then clamped so a correction can never produce
//! a negative duration.

/// Correction applied to every raw batch measurement of a run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeScaling {
    /// Multiplicative factor applied to the raw duration
    pub factor: f64,
    /// Nanoseconds added after scaling (may be negative)
    pub increment_ns: i64,
}

impl TimeScaling {
    /// No correction: factor 1, increment 0
    pub const IDENTITY: TimeScaling = TimeScaling {
        factor: 1.0,
        increment_ns: 0,
    };

    /// Apply this correction to a raw duration
    #[inline]
    pub fn apply(&self, raw_ns: u64) -> u64 {
        scale_duration(raw_ns, self.factor, self.increment_ns)
    }
}

impl Default for TimeScaling {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Scale a raw duration: `max(0, trunc(raw * factor) + increment)`
///
/// The product is truncated toward zero before the increment is added.
/// Arithmetic saturates instead of wrapping.
#[inline]
pub fn scale_duration(raw_ns: u64, factor: f64, increment_ns: i64) -> u64 {
    // f64 -> i64 casts saturate, NaN maps to 0
    let scaled = (raw_ns as f64 * factor) as i64;
    scaled.saturating_add(increment_ns).max(0) as u64
}
