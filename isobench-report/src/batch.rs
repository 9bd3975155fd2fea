//! Batch Report
//!
//! JSON summary of one orchestrated batch, written as `batch.json` into the
//! output root once every suite has been dispatched.

use crate::{BATCH_REPORT_FILE, ReportError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Summary of an orchestrated batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    /// Layout version of this file
    pub schema_version: u32,
    /// isobench version that wrote it
    pub version: String,
    /// When the first suite was dispatched
    pub started: DateTime<Utc>,
    /// When the last suite returned; `None` while the batch runs
    pub finished: Option<DateTime<Utc>>,
    /// Directory every suite wrote below
    pub output_root: PathBuf,
    /// Whether suites ran in dedicated child processes
    pub isolated: bool,
    /// Host the batch ran on
    pub host: HostInfo,
    /// One entry per dispatched suite, in dispatch order
    pub suites: Vec<SuiteOutcome>,
}

/// Host facts captured when the batch starts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostInfo {
    /// Logical processors available
    pub processors: usize,
    /// One-minute load average (0 when unavailable)
    pub load_average: f64,
}

/// How a suite invocation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuiteStatus {
    /// Ran to the end (individual groups may still have failed)
    Completed,
    /// Fatal error inside the suite, or non-zero child exit
    Failed,
    /// The child process could not be started or wired up
    LaunchFailed,
}

/// Outcome of one dispatched suite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteOutcome {
    /// Suite identifier
    pub suite: String,
    /// Start of the suite's progress window (percent)
    pub progress_start: f64,
    /// Size of the suite's progress window (percent)
    pub progress_size: f64,
    /// How the suite ended
    pub status: SuiteStatus,
    /// Exit code of the worker; absent in-process or when killed by a signal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Why the suite did not complete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Wall-clock time spent on the suite
    pub elapsed_ms: u64,
}

impl BatchReport {
    /// Current batch report schema
    pub const SCHEMA_VERSION: u32 = 1;

    /// Start a report for a batch writing into `output_root`
    pub fn new(output_root: impl Into<PathBuf>, isolated: bool, host: HostInfo) -> Self {
        Self {
            schema_version: Self::SCHEMA_VERSION,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started: Utc::now(),
            finished: None,
            output_root: output_root.into(),
            isolated,
            host,
            suites: Vec::new(),
        }
    }

    /// Number of suites that did not complete
    pub fn failed_count(&self) -> usize {
        self.suites
            .iter()
            .filter(|s| s.status != SuiteStatus::Completed)
            .count()
    }

    /// Stamp the finish time and write `batch.json` into the output root
    pub fn finish_and_write(&mut self) -> Result<PathBuf, ReportError> {
        self.finished = Some(Utc::now());
        let path = self.output_root.join(BATCH_REPORT_FILE);
        std::fs::create_dir_all(&self.output_root)?;
        std::fs::write(&path, generate_json_report(self)?)?;
        Ok(path)
    }

    /// Load a previously written batch report
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ReportError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Generate a prettified JSON report.
pub fn generate_json_report(report: &BatchReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(suite: &str, status: SuiteStatus) -> SuiteOutcome {
        SuiteOutcome {
            suite: suite.to_string(),
            progress_start: 0.0,
            progress_size: 50.0,
            status,
            exit_code: None,
            message: None,
            elapsed_ms: 12,
        }
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&SuiteStatus::LaunchFailed).unwrap();
        assert_eq!(json, "\"launch_failed\"");
    }

    #[test]
    fn test_write_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let host = HostInfo {
            processors: 8,
            load_average: 0.5,
        };
        let mut report = BatchReport::new(dir.path(), true, host);
        report.suites.push(outcome("codec", SuiteStatus::Completed));
        report.suites.push(outcome("collections", SuiteStatus::Failed));

        let path = report.finish_and_write().unwrap();
        assert_eq!(path, dir.path().join("batch.json"));

        let loaded = BatchReport::load(&path).unwrap();
        assert!(loaded.finished.is_some());
        assert_eq!(loaded.suites.len(), 2);
        assert_eq!(loaded.failed_count(), 1);
        assert_eq!(loaded.host.processors, 8);
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let json = serde_json::to_string(&outcome("codec", SuiteStatus::Completed)).unwrap();
        assert!(!json.contains("exit_code"));
        assert!(!json.contains("message"));
    }
}
