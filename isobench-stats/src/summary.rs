//! Run Statistics
//!
//! Aggregates the repetitions of one run into the values recorded for it:
//! - `run_duration_ns`: sum of the scaled batch totals
//! - `call_average_ns`: mean of the per-repetition per-call estimates
//! - `call_std_dev_ns`: POPULATION standard deviation (divide by N) of the
//!   per-repetition per-call estimates
//!
//! A single repetition is reported as measured, with a deviation of 0.

use crate::UNKNOWN_DURATION;

/// One timed batch of calls, after scaling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepetitionMeasurement {
    /// Scaled duration of the whole batch in nanoseconds
    pub scaled_total_ns: u64,
    /// Number of calls in the batch
    pub calls: u64,
}

impl RepetitionMeasurement {
    /// Create a measurement for a batch of `calls` invocations
    pub fn new(scaled_total_ns: u64, calls: u64) -> Self {
        Self {
            scaled_total_ns,
            calls,
        }
    }

    /// Per-call estimate for this repetition (integer nanoseconds, truncated)
    #[inline]
    pub fn per_call_ns(&self) -> u64 {
        self.scaled_total_ns / self.calls.max(1)
    }
}

/// Statistics recorded for a completed run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunStatistics {
    /// Total scaled duration of all repetitions (`-1` when unknown)
    pub run_duration_ns: i64,
    /// Mean per-call duration (`-1` when unknown)
    pub call_average_ns: i64,
    /// Population standard deviation of the per-call estimates
    pub call_std_dev_ns: f64,
    /// Number of repetitions the statistics were computed from
    pub repetitions: usize,
}

impl RunStatistics {
    /// Statistics of a run that never completed a repetition
    pub const UNKNOWN: RunStatistics = RunStatistics {
        run_duration_ns: UNKNOWN_DURATION,
        call_average_ns: UNKNOWN_DURATION,
        call_std_dev_ns: 0.0,
        repetitions: 0,
    };

    /// Coefficient of variation of the per-call estimates (percent)
    pub fn coefficient_of_variation(&self) -> f64 {
        if self.call_average_ns <= 0 {
            0.0
        } else {
            (self.call_std_dev_ns / self.call_average_ns as f64) * 100.0
        }
    }
}

/// Aggregate the repetitions of a run
pub fn compute_run_statistics(measurements: &[RepetitionMeasurement]) -> RunStatistics {
    match measurements {
        [] => RunStatistics::UNKNOWN,
        [single] => RunStatistics {
            run_duration_ns: clamp_i64(single.scaled_total_ns),
            call_average_ns: clamp_i64(single.per_call_ns()),
            call_std_dev_ns: 0.0,
            repetitions: 1,
        },
        many => {
            let run_duration = many
                .iter()
                .fold(0u64, |acc, m| acc.saturating_add(m.scaled_total_ns));

            let per_call: Vec<f64> = many.iter().map(|m| m.per_call_ns() as f64).collect();
            let average = mean(&per_call);
            let std_dev = population_std_dev(&per_call, average);

            RunStatistics {
                run_duration_ns: clamp_i64(run_duration),
                call_average_ns: average as i64,
                call_std_dev_ns: std_dev,
                repetitions: many.len(),
            }
        }
    }
}

/// Arithmetic mean (0 for an empty slice)
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Population standard deviation around `mean` (divides by N, not N-1)
pub fn population_std_dev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
