#![warn(missing_docs)]
//! isobench Report - Persisted Results
//!
//! Everything a benchmark batch leaves on disk:
//! - Record files: one tab-separated file per operation group, one row per run
//! - Error files: message and trace of a failed operation group
//! - Batch report: JSON summary of every suite dispatched by the orchestrator

mod batch;
mod error_log;
mod record;

pub use batch::{BatchReport, HostInfo, SuiteOutcome, SuiteStatus, generate_json_report};
pub use error_log::{format_error_report, write_error_file};
pub use record::{RecordFile, RecordWriter, read_records};

use thiserror::Error;

/// Extension of record files
pub const RECORD_EXTENSION: &str = "tsv";

/// Extension of error files written next to record files
pub const ERROR_EXTENSION: &str = "log";

/// File name of the batch report in the output root
pub const BATCH_REPORT_FILE: &str = "batch.json";

/// Errors raised while writing or reading persisted results
#[derive(Debug, Error)]
pub enum ReportError {
    /// Reading or writing a file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The batch report could not be encoded or decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A row was written outside a group
    #[error("No record file is open")]
    NotOpen,

    /// A record file line does not match its header
    #[error("Malformed record file at line {line}: {message}")]
    Malformed {
        /// 1-based line number
        line: usize,
        /// What is wrong with the line
        message: String,
    },
}
