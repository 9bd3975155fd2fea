//! Run Descriptors
//!
//! A run is one parameterization of an operation group. Suites create the
//! descriptors at group start; the engine fills in the statistics once every
//! repetition of the run has been measured. Statistics are written exactly
//! once and are read-only afterwards.

use isobench_stats::{RunStatistics, TimeScaling, UNKNOWN_DURATION};

/// One parameterized execution of an operation group
#[derive(Debug, Clone, PartialEq)]
pub struct RunDescriptor {
    name: String,
    scaling: TimeScaling,
    statistics: Option<RunStatistics>,
}

impl RunDescriptor {
    /// A run with no time correction
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scaling: TimeScaling::IDENTITY,
            statistics: None,
        }
    }

    /// Correct every raw batch time as `raw * factor + increment_ns`
    pub fn with_time_scaling(mut self, factor: f64, increment_ns: i64) -> Self {
        self.scaling = TimeScaling {
            factor,
            increment_ns,
        };
        self
    }

    /// Run name, unique within its group
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Correction applied to every raw batch time
    pub fn time_scaling(&self) -> TimeScaling {
        self.scaling
    }

    /// Multiplier of the correction
    pub fn time_scaling_factor(&self) -> f64 {
        self.scaling.factor
    }

    /// Nanoseconds added after scaling
    pub fn time_increment(&self) -> i64 {
        self.scaling.increment_ns
    }

    /// Total scaled duration of the run in nanoseconds, `-1` until completed
    pub fn run_duration(&self) -> i64 {
        self.statistics
            .map_or(UNKNOWN_DURATION, |s| s.run_duration_ns)
    }

    /// Mean per-call duration in nanoseconds, `-1` until completed
    pub fn call_average_duration(&self) -> i64 {
        self.statistics
            .map_or(UNKNOWN_DURATION, |s| s.call_average_ns)
    }

    /// Population standard deviation of the per-call estimates
    pub fn call_standard_deviation(&self) -> f64 {
        self.statistics.map_or(0.0, |s| s.call_std_dev_ns)
    }

    /// Full statistics once the run has completed
    pub fn statistics(&self) -> Option<&RunStatistics> {
        self.statistics.as_ref()
    }

    /// Whether the statistics were recorded
    pub fn is_completed(&self) -> bool {
        self.statistics.is_some()
    }

    /// Store the statistics. Only the first call has an effect.
    pub(crate) fn complete(&mut self, statistics: RunStatistics) -> bool {
        if self.statistics.is_some() {
            tracing::warn!(run = %self.name, "run statistics already recorded, ignoring");
            return false;
        }
        self.statistics = Some(statistics);
        true
    }
}
