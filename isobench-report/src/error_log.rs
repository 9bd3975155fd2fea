//! Error files
//!
//! A failed operation group leaves a plain text file next to its record file:
//! the first line is the error message, the rest is the `source()` chain and
//! the backtrace when one was captured.

use crate::ReportError;
use std::error::Error;
use std::fmt::Write as _;
use std::path::Path;

/// Render an error, its causes and an optional backtrace as plain text
pub fn format_error_report(error: &dyn Error, backtrace: Option<&str>) -> String {
    let mut out = error.to_string();
    out.push('\n');

    let mut source = error.source();
    while let Some(cause) = source {
        let _ = writeln!(out, "Caused by: {cause}");
        source = cause.source();
    }

    if let Some(trace) = backtrace.map(str::trim_end).filter(|t| !t.is_empty()) {
        out.push_str(trace);
        out.push('\n');
    }

    out
}

/// Write an error report to `path`, creating parent directories
pub fn write_error_file(
    path: impl AsRef<Path>,
    error: &dyn Error,
    backtrace: Option<&str>,
) -> Result<(), ReportError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, format_error_report(error, backtrace))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Outer(std::io::Error);

    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "group failed")
        }
    }

    impl Error for Outer {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_message_is_first_line() {
        let err = std::io::Error::other("connection refused");
        let text = format_error_report(&err, None);
        assert_eq!(text, "connection refused\n");
    }

    #[test]
    fn test_cause_chain_and_trace() {
        let err = Outer(std::io::Error::other("disk full"));
        let text = format_error_report(&err, Some("   0: frame\n"));
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "group failed");
        assert_eq!(lines[1], "Caused by: disk full");
        assert_eq!(lines[2], "   0: frame");
    }

    #[test]
    fn test_write_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("suite").join("decode.log");
        let err = std::io::Error::other("boom");

        write_error_file(&path, &err, None).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "boom\n");
    }
}
