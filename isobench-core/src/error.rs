//! Engine errors

use isobench_report::ReportError;
use std::backtrace::{Backtrace, BacktraceStatus};
use thiserror::Error;

/// Errors raised while executing a suite
#[derive(Debug, Error)]
pub enum BenchError {
    /// Filesystem failure (output directory, record file)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `initialize` failed; the whole suite is abandoned
    #[error("Suite '{suite}' failed to initialize")]
    Setup {
        /// Suite identifier
        suite: String,
        /// Underlying failure
        #[source]
        source: Box<BenchError>,
    },

    /// An operation invocation returned an error
    #[error("Operation '{group}' failed during run '{run}'")]
    Operation {
        /// Operation group
        group: String,
        /// Run being measured
        run: String,
        /// Error returned by the operation
        #[source]
        source: Box<BenchError>,
        /// Backtrace captured when the failure reached the engine
        backtrace: Option<String>,
    },

    /// Something panicked while the group was executing
    #[error("Operation '{group}' panicked: {message}")]
    Panic {
        /// Operation group
        group: String,
        /// Panic payload
        message: String,
        /// Backtrace captured after unwinding
        backtrace: Option<String>,
    },

    /// No registered suite has this identifier
    #[error("Unknown suite: {0}")]
    UnknownSuite(String),

    /// Required configuration keys are absent
    #[error("Suite '{suite}' requires missing properties: {}", missing.join(", "))]
    MissingProperties {
        /// Suite identifier
        suite: String,
        /// Keys that were not supplied
        missing: Vec<String>,
    },

    /// Record or error file failure
    #[error(transparent)]
    Report(#[from] ReportError),

    /// Free-form failure raised by suite code
    #[error("{0}")]
    Message(String),
}

impl BenchError {
    /// Free-form error for use inside suites and operations
    pub fn msg(message: impl Into<String>) -> Self {
        BenchError::Message(message.into())
    }

    /// Backtrace attached to this error, if one was captured
    pub fn backtrace(&self) -> Option<&str> {
        match self {
            BenchError::Operation { backtrace, .. } | BenchError::Panic { backtrace, .. } => {
                backtrace.as_deref()
            }
            _ => None,
        }
    }
}

/// Capture a backtrace when `RUST_BACKTRACE` enables it
pub(crate) fn capture_backtrace() -> Option<String> {
    let backtrace = Backtrace::capture();
    match backtrace.status() {
        BacktraceStatus::Captured => Some(backtrace.to_string()),
        _ => None,
    }
}

/// Extract the message from a `catch_unwind` payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_operation_error_keeps_source() {
        let err = BenchError::Operation {
            group: "decode".to_string(),
            run: "small".to_string(),
            source: Box::new(BenchError::msg("bad frame")),
            backtrace: None,
        };
        assert_eq!(err.to_string(), "Operation 'decode' failed during run 'small'");
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("bad frame"));
    }

    #[test]
    fn test_panic_payloads() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("static str");
        assert_eq!(panic_message(payload.as_ref()), "static str");

        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");

        let payload: Box<dyn std::any::Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "Unknown panic");
    }

    #[test]
    fn test_missing_properties_message() {
        let err = BenchError::MissingProperties {
            suite: "net".to_string(),
            missing: vec!["host".to_string(), "port".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Suite 'net' requires missing properties: host, port"
        );
    }
}
