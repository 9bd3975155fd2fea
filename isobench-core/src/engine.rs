//! Suite Engine
//!
//! Executes every operation group of a suite in declaration order. Each
//! repetition times `calls_per_repetition` invocations as one batch, scales
//! the batch time with the run's correction and feeds the result to the run
//! statistics.
//!
//! Fault isolation is per group: an error or panic anywhere inside a group is
//! handed to [`Suite::report_error`], the group is still ended with the runs
//! terminated so far, and the next group starts normally. Only
//! a failing `initialize` (or an unusable output directory) aborts the suite.

use crate::error::{BenchError, capture_backtrace, panic_message};
use crate::measure::Timer;
use crate::progress::{ProgressWindow, format_progress};
use crate::run::RunDescriptor;
use crate::suite::{Operation, Suite, SuiteContext, SuiteEnv};
use isobench_stats::{RepetitionMeasurement, compute_run_statistics};
use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::{debug, info, warn};

/// What happened to the groups of one suite
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuiteSummary {
    /// Suite identifier
    pub suite: String,
    /// Groups that ran to completion, in execution order
    pub completed_groups: Vec<String>,
    /// Groups that failed and were reported, in execution order
    pub failed_groups: Vec<String>,
}

impl SuiteSummary {
    /// Whether every group completed
    pub fn all_completed(&self) -> bool {
        self.failed_groups.is_empty()
    }
}

/// Object-safe handle on a runnable suite, produced by suite factories
pub trait SuiteExecution {
    /// Suite identifier
    fn id(&self) -> &str;

    /// Execute every group, reporting progress inside `window`
    fn run_all(&mut self, window: ProgressWindow) -> Result<SuiteSummary, BenchError>;
}

/// The execution engine for one suite instance
pub struct BenchmarkSuite<S: Suite> {
    suite: S,
    ctx: SuiteContext,
    group_ended: bool,
}

impl<S: Suite> BenchmarkSuite<S> {
    /// Engine for `suite`, writing below `env.output_root`
    pub fn new(id: impl Into<String>, suite: S, env: &SuiteEnv) -> Self {
        Self {
            suite,
            ctx: SuiteContext::new(id, env),
            group_ended: false,
        }
    }

    /// The wrapped suite
    pub fn suite(&self) -> &S {
        &self.suite
    }

    /// The execution context
    pub fn context(&self) -> &SuiteContext {
        &self.ctx
    }

    /// Execute the suite: initialize, every group, dispose
    pub fn run_all(&mut self, window: ProgressWindow) -> Result<SuiteSummary, BenchError> {
        let suite_id = self.ctx.suite_id().to_string();
        self.ctx.progress = window.start;
        info!(suite = %suite_id, progress = %format_progress(window.start), "initializing suite");

        self.initialize()?;

        let mut operations = self.suite.operations();
        let mut summary = SuiteSummary {
            suite: suite_id.clone(),
            ..SuiteSummary::default()
        };

        let count = operations.len();
        for (operation, group_window) in operations.iter_mut().zip(window.split(count)) {
            let group = operation.name().to_string();
            let outcome = self.run_group_isolated(operation, group_window);

            // Runs never outlive their group
            self.ctx.current_run = None;

            match outcome {
                Ok(()) => summary.completed_groups.push(group),
                Err(err) => {
                    self.suite.report_error(&mut self.ctx, &group, &err);
                    // Runs terminated before the failure are still handed over
                    if self.group_ended {
                        debug!(suite = %suite_id, group = %group, "group end already ran");
                    } else if let Err(end_err) = self.end_failed_group(&group) {
                        warn!(suite = %suite_id, group = %group, "group end after failure: {end_err}");
                    }
                    summary.failed_groups.push(group);
                }
            }
            self.ctx.progress = group_window.end();
        }

        if let Err(err) = self.suite.dispose(&mut self.ctx) {
            warn!(suite = %suite_id, "dispose failed: {err}");
        }

        info!(
            suite = %suite_id,
            progress = %format_progress(window.end()),
            completed = summary.completed_groups.len(),
            failed = summary.failed_groups.len(),
            "suite finished"
        );
        Ok(summary)
    }

    fn initialize(&mut self) -> Result<(), BenchError> {
        let setup_error = |suite: &str, source: BenchError| BenchError::Setup {
            suite: suite.to_string(),
            source: Box::new(source),
        };

        std::fs::create_dir_all(self.ctx.output_dir())
            .map_err(|e| setup_error(self.ctx.suite_id(), e.into()))?;

        let result = catch_unwind(AssertUnwindSafe(|| self.suite.initialize(&mut self.ctx)));
        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(setup_error(self.ctx.suite_id(), err)),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                Err(setup_error(self.ctx.suite_id(), BenchError::Message(message)))
            }
        }
    }

    fn end_failed_group(&mut self, group: &str) -> Result<(), BenchError> {
        let result = catch_unwind(AssertUnwindSafe(|| self.suite.on_group_end(&mut self.ctx, group)));
        result.unwrap_or_else(|panic| Err(BenchError::Message(panic_message(panic.as_ref()))))
    }

    /// Run one group, converting a panic into an error
    fn run_group_isolated(
        &mut self,
        operation: &mut Operation<S>,
        window: ProgressWindow,
    ) -> Result<(), BenchError> {
        let result = catch_unwind(AssertUnwindSafe(|| self.run_group(operation, window)));
        match result {
            Ok(outcome) => outcome,
            Err(panic) => Err(BenchError::Panic {
                group: operation.name().to_string(),
                message: panic_message(panic.as_ref()),
                backtrace: capture_backtrace(),
            }),
        }
    }

    fn run_group(
        &mut self,
        operation: &mut Operation<S>,
        window: ProgressWindow,
    ) -> Result<(), BenchError> {
        let group = operation.name().to_string();
        self.group_ended = false;
        self.ctx.terminated_runs.clear();
        self.ctx.progress = window.start;
        info!(
            suite = %self.ctx.suite_id(),
            group = %group,
            progress = %format_progress(window.start),
            "starting operation group"
        );

        let runs = self.suite.on_group_start(&mut self.ctx, &group)?;
        let count = runs.len();
        for (run, run_window) in runs.into_iter().zip(window.split(count)) {
            self.execute_run(operation, run, run_window)?;
        }

        self.group_ended = true;
        self.suite.on_group_end(&mut self.ctx, &group)?;
        info!(
            suite = %self.ctx.suite_id(),
            group = %group,
            progress = %format_progress(window.end()),
            runs = count,
            "finished operation group"
        );
        Ok(())
    }

    fn execute_run(
        &mut self,
        operation: &mut Operation<S>,
        mut run: RunDescriptor,
        window: ProgressWindow,
    ) -> Result<(), BenchError> {
        let repetitions = self.ctx.repetitions_per_run();
        let calls = self.ctx.calls_per_repetition();
        let scaling = run.time_scaling();
        self.ctx.current_run = Some(run.clone());

        if repetitions > 1 {
            self.suite.on_run_start(&mut self.ctx, &run)?;
        }

        let mut measurements = Vec::with_capacity(repetitions);
        for (repetition, rep_window) in window.split(repetitions).enumerate() {
            self.ctx.progress = rep_window.start;
            self.suite.on_repetition_start(&mut self.ctx, &run, repetition)?;

            let delay = self.ctx.warmup_delay();
            info!(
                group = %operation.name(),
                run = %run.name(),
                repetition,
                progress = %format_progress(rep_window.start),
                "preparing repetition, waiting {delay:?}"
            );
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }

            let raw_ns = self.measure_batch(operation, &run, calls)?;
            let scaled_ns = scaling.apply(raw_ns);
            measurements.push(RepetitionMeasurement::new(scaled_ns, calls));

            self.ctx.progress = rep_window.end();
            debug!(
                group = %operation.name(),
                run = %run.name(),
                repetition,
                raw_ns,
                scaled_ns,
                progress = %format_progress(rep_window.end()),
                "repetition measured"
            );
        }

        let statistics = compute_run_statistics(&measurements);
        run.complete(statistics);
        self.ctx.current_run = None;
        info!(
            group = %operation.name(),
            run = %run.name(),
            run_duration_ns = run.run_duration(),
            call_average_ns = run.call_average_duration(),
            call_std_dev_ns = run.call_standard_deviation(),
            call_cv_pct = %format!("{:.2}", statistics.coefficient_of_variation()),
            "run completed"
        );

        self.ctx.terminated_runs.push(run.clone());
        self.suite.on_run_end(&mut self.ctx, &run)
    }

    /// Time `calls` invocations as one batch
    fn measure_batch(
        &mut self,
        operation: &mut Operation<S>,
        run: &RunDescriptor,
        calls: u64,
    ) -> Result<u64, BenchError> {
        let timer = Timer::start();
        for _ in 0..calls {
            if let Err(source) = operation.call(&mut self.suite) {
                return Err(BenchError::Operation {
                    group: operation.name().to_string(),
                    run: run.name().to_string(),
                    source: Box::new(source),
                    backtrace: capture_backtrace(),
                });
            }
        }
        Ok(timer.stop())
    }
}

impl<S: Suite> SuiteExecution for BenchmarkSuite<S> {
    fn id(&self) -> &str {
        self.ctx.suite_id()
    }

    fn run_all(&mut self, window: ProgressWindow) -> Result<SuiteSummary, BenchError> {
        BenchmarkSuite::run_all(self, window)
    }
}
