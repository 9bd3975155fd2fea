#![warn(missing_docs)]
//! # isobench
//!
//! Micro-benchmark suites measured in isolated processes.
//!
//! - **Suites**: a suite declares operation groups; each group is exercised
//!   over one or more runs, each run timed over repeated batches of calls
//! - **Statistics**: total duration, mean per-call duration and population
//!   standard deviation per run, with optional linear time correction
//! - **Records**: one tab-separated file per group, one row per run, plus an
//!   error file for every group that failed
//! - **Isolation**: by default each suite runs in a fresh child process whose
//!   output is relayed to the terminal; a crashing suite never takes the
//!   batch down
//!
//! ## Quick Start
//!
//! ```ignore
//! use isobench::prelude::*;
//!
//! #[derive(Default)]
//! struct Sorting {
//!     data: Vec<u64>,
//! }
//!
//! impl RecordedSuite for Sorting {
//!     fn operations(&self) -> Vec<Operation<Self>> {
//!         vec![Operation::infallible("sort", |s: &mut Sorting| s.data.sort())]
//!     }
//! }
//!
//! register_suite!("sorting" => RecordingSuite::new(Sorting::default()));
//!
//! fn main() -> anyhow::Result<()> {
//!     isobench::run()
//! }
//! ```

// Re-export core types
pub use isobench_core::{
    BenchError, BenchmarkSuite, GroupRecorder, Operation, ProgressWindow, RecordedSuite,
    RecordingSuite, RunDescriptor, STANDARD_COLUMNS, Suite, SuiteContext, SuiteDef, SuiteEnv,
    SuiteExecution, SuiteRegistry, SuiteSummary, Timer, register_suite, standard_headers,
};

// Re-export stats
pub use isobench_stats::{RunStatistics, TimeScaling, compute_run_statistics};

// Re-export report types
pub use isobench_report::{BatchReport, RecordFile, SuiteStatus, read_records};

// Re-export the front-end
pub use isobench_cli::{
    Cli, IsobenchConfig, OrchestratorConfig, ProcessOrchestrator, launch_suites,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BenchError, GroupRecorder, Operation, RecordedSuite, RecordingSuite, RunDescriptor,
        Suite, SuiteContext, register_suite,
    };
}

/// Run the isobench CLI harness.
///
/// Call this from your suite binary's `main()`:
/// ```ignore
/// fn main() -> anyhow::Result<()> {
///     isobench::run()
/// }
/// ```
pub use isobench_cli::run;
