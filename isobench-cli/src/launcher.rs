//! Suite Launcher
//!
//! Runs suites inside the current process. Used directly in in-process mode,
//! and by worker processes re-entered through `--suite-worker`:
//!
//! ```text
//! <exe> [-D key=value ...] --memory-limit-mb <N> --suite-worker <outputDir> <progressStart> <progressWindow> <suiteId> [<suiteId> ...]
//! ```
//!
//! Several suite identifiers share the progress window equally and run in
//! the order given.

use isobench_core::{BenchError, ProgressWindow, SuiteEnv, SuiteRegistry, SuiteSummary};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, info};

/// Flag selecting worker mode
pub const WORKER_FLAG: &str = "--suite-worker";

/// Malformed worker arguments
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkerArgsError {
    /// A positional argument is absent
    #[error("Missing worker argument: {0}")]
    Missing(&'static str),

    /// A progress argument is not a number
    #[error("Invalid {name}: {value:?}")]
    InvalidNumber {
        /// Argument name
        name: &'static str,
        /// Text that failed to parse
        value: String,
    },
}

/// Positional arguments of a worker process
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerInvocation {
    /// Output root shared by the batch
    pub output_dir: PathBuf,
    /// Slice of overall progress owned by this worker
    pub window: ProgressWindow,
    /// Suites to run, in order
    pub suites: Vec<String>,
}

impl WorkerInvocation {
    /// Positional arguments following the worker flag
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            self.output_dir.display().to_string(),
            self.window.start.to_string(),
            self.window.size.to_string(),
        ];
        args.extend(self.suites.iter().cloned());
        args
    }

    /// Parse the positional arguments following the worker flag
    pub fn parse<I, S>(args: I) -> Result<Self, WorkerArgsError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = args.into_iter().map(Into::into);

        let output_dir = args
            .next()
            .ok_or(WorkerArgsError::Missing("output directory"))?;
        let start = parse_percent(args.next(), "progress start")?;
        let size = parse_percent(args.next(), "progress window")?;
        let suites: Vec<String> = args.collect();
        if suites.is_empty() {
            return Err(WorkerArgsError::Missing("suite identifier"));
        }

        Ok(Self {
            output_dir: PathBuf::from(output_dir),
            window: ProgressWindow::new(start, size),
            suites,
        })
    }
}

fn parse_percent(value: Option<String>, name: &'static str) -> Result<f64, WorkerArgsError> {
    let value = value.ok_or(WorkerArgsError::Missing(name))?;
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(WorkerArgsError::InvalidNumber { name, value }),
    }
}

/// Result of one suite launched in this process
#[derive(Debug)]
pub struct LaunchResult {
    /// Suite identifier
    pub suite: String,
    /// Window the suite reported progress in
    pub window: ProgressWindow,
    /// Group summary, or the fatal error that stopped the suite
    pub outcome: Result<SuiteSummary, BenchError>,
}

/// Run `suites` one after the other inside this process
///
/// A fatal error in one suite is logged and the next suite still runs.
pub fn launch_suites(
    registry: &SuiteRegistry,
    env: &SuiteEnv,
    window: ProgressWindow,
    suites: &[String],
) -> Vec<LaunchResult> {
    suites
        .iter()
        .zip(window.split(suites.len()))
        .map(|(id, suite_window)| {
            let outcome = registry
                .create(id, env)
                .and_then(|mut suite| suite.run_all(suite_window));

            match &outcome {
                Ok(summary) => info!(
                    suite = %id,
                    completed = summary.completed_groups.len(),
                    failed = summary.failed_groups.len(),
                    "suite completed"
                ),
                Err(e) => error!(suite = %id, "suite aborted: {e}"),
            }

            LaunchResult {
                suite: id.clone(),
                window: suite_window,
                outcome,
            }
        })
        .collect()
}

/// Cap the address space of this process at `limit_mb` MiB (0 = no limit)
#[cfg(unix)]
pub fn apply_memory_limit(limit_mb: u64) -> std::io::Result<()> {
    if limit_mb == 0 {
        return Ok(());
    }

    let bytes = limit_mb.saturating_mul(1024 * 1024) as libc::rlim_t;
    let limit = libc::rlimit {
        rlim_cur: bytes,
        rlim_max: bytes,
    };
    // SAFETY: `limit` is a valid rlimit for the duration of the call.
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_AS, &limit) };
    if ret != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// No address space limit on this platform
#[cfg(not(unix))]
pub fn apply_memory_limit(_limit_mb: u64) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_round_trip() {
        let invocation = WorkerInvocation {
            output_dir: PathBuf::from("/tmp/isobench/run"),
            window: ProgressWindow::new(33.333333333333336, 33.333333333333336),
            suites: vec!["codec".into()],
        };

        let parsed = WorkerInvocation::parse(invocation.to_args()).unwrap();
        assert_eq!(parsed, invocation);
    }

    #[test]
    fn test_several_suites() {
        let parsed = WorkerInvocation::parse(["out", "0", "100", "a", "b"]).unwrap();
        assert_eq!(parsed.suites, vec!["a", "b"]);
        assert_eq!(parsed.window, ProgressWindow::FULL);
    }

    #[test]
    fn test_missing_and_invalid_arguments() {
        assert_eq!(
            WorkerInvocation::parse(Vec::<String>::new()).unwrap_err(),
            WorkerArgsError::Missing("output directory")
        );
        assert_eq!(
            WorkerInvocation::parse(["out", "0", "100"]).unwrap_err(),
            WorkerArgsError::Missing("suite identifier")
        );
        assert!(matches!(
            WorkerInvocation::parse(["out", "half", "100", "a"]).unwrap_err(),
            WorkerArgsError::InvalidNumber { name: "progress start", .. }
        ));
        assert!(matches!(
            WorkerInvocation::parse(["out", "0", "NaN", "a"]).unwrap_err(),
            WorkerArgsError::InvalidNumber { name: "progress window", .. }
        ));
    }

    #[test]
    fn test_unknown_suite_does_not_stop_the_others() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SuiteRegistry::from_defs(Vec::new());
        let results = launch_suites(
            &registry,
            &SuiteEnv::new(dir.path()),
            ProgressWindow::FULL,
            &["missing".to_string(), "also-missing".to_string()],
        );

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.outcome.is_err()));
        assert_eq!(results[1].window, ProgressWindow::new(50.0, 50.0));
    }

    #[test]
    fn test_zero_memory_limit_is_a_no_op() {
        apply_memory_limit(0).unwrap();
    }
}
