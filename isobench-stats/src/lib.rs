#![warn(missing_docs)]
//! isobench Statistics
//!
//! Turns raw batch timings into the numbers recorded for a run:
//! - Time scaling (`max(0, raw * factor + increment)`) applied per repetition
//! - Per-call estimates for each repetition
//! - Run aggregation: total duration, mean per-call duration and the
//!   population standard deviation of the per-call estimates

mod scaling;
mod summary;

pub use scaling::{TimeScaling, scale_duration};
pub use summary::{
    RepetitionMeasurement, RunStatistics, compute_run_statistics, mean, population_std_dev,
};

/// Marker for a duration that has not been measured yet
pub const UNKNOWN_DURATION: i64 = -1;
