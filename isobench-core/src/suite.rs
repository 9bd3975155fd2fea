//! Suites and their execution context
//!
//! A suite is a set of named operations sharing setup and teardown. The
//! engine drives it through the [`Suite`] hooks:
//!
//! ```text
//! initialize
//! for each operation (declaration order):
//!     on_group_start -> runs
//!     for each run:
//!         on_run_start            (only with more than one repetition)
//!         for each repetition:
//!             on_repetition_start
//!             warm-up delay
//!             measure calls_per_repetition invocations
//!         on_run_end
//!     on_group_end
//!     report_error                (instead of the remaining hooks, if anything failed)
//! dispose
//! ```

use crate::error::BenchError;
use crate::host;
use crate::progress::format_progress;
use crate::run::RunDescriptor;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Reserved property seeding [`SuiteContext::calls_per_repetition`]
pub const CALLS_PER_REPETITION_KEY: &str = "isobench.calls_per_repetition";
/// Reserved property seeding [`SuiteContext::repetitions_per_run`]
pub const REPETITIONS_PER_RUN_KEY: &str = "isobench.repetitions_per_run";
/// Reserved property seeding [`SuiteContext::warmup_delay`], in milliseconds
pub const WARMUP_DELAY_MS_KEY: &str = "isobench.warmup_delay_ms";

/// Default number of invocations timed as one batch
pub const DEFAULT_CALLS_PER_REPETITION: u64 = 100_000;
/// Default number of timed batches per run
pub const DEFAULT_REPETITIONS_PER_RUN: usize = 10;
/// Default pause before each repetition
pub const DEFAULT_WARMUP_DELAY: Duration = Duration::from_secs(1);

type OperationFn<S> = Box<dyn FnMut(&mut S) -> Result<(), BenchError>>;

/// A named unit of work timed by the engine
pub struct Operation<S> {
    name: String,
    call: OperationFn<S>,
}

impl<S: 'static> Operation<S> {
    /// An operation that may fail
    pub fn new<F>(name: impl Into<String>, call: F) -> Self
    where
        F: FnMut(&mut S) -> Result<(), BenchError> + 'static,
    {
        Self {
            name: name.into(),
            call: Box::new(call),
        }
    }

    /// An operation that cannot fail
    pub fn infallible<F>(name: impl Into<String>, mut call: F) -> Self
    where
        F: FnMut(&mut S) + 'static,
    {
        Self::new(name, move |suite: &mut S| {
            call(suite);
            Ok(())
        })
    }

    /// Operation group name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the operation once
    #[inline]
    pub fn call(&mut self, suite: &mut S) -> Result<(), BenchError> {
        (self.call)(suite)
    }

    /// Rebind the operation to a wrapper owning the original suite
    pub fn project<T: 'static>(self, inner: fn(&mut T) -> &mut S) -> Operation<T> {
        let mut call = self.call;
        Operation {
            name: self.name,
            call: Box::new(move |outer: &mut T| call(inner(outer))),
        }
    }
}

impl<S> std::fmt::Debug for Operation<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation").field("name", &self.name).finish()
    }
}

/// Lifecycle hooks of a benchmark suite
///
/// Only [`Suite::operations`] is required. The default group start yields a
/// single run named after the group.
pub trait Suite: Sized + 'static {
    /// Suite-specific setup. An error here abandons the whole suite.
    fn initialize(&mut self, _ctx: &mut SuiteContext) -> Result<(), BenchError> {
        Ok(())
    }

    /// Operation groups in execution order. Called once, after `initialize`.
    fn operations(&self) -> Vec<Operation<Self>>;

    /// Define the runs exercised for `group`
    fn on_group_start(
        &mut self,
        _ctx: &mut SuiteContext,
        group: &str,
    ) -> Result<Vec<RunDescriptor>, BenchError> {
        Ok(vec![RunDescriptor::new(group)])
    }

    /// Before the first repetition of a run with more than one repetition
    fn on_run_start(
        &mut self,
        _ctx: &mut SuiteContext,
        _run: &RunDescriptor,
    ) -> Result<(), BenchError> {
        Ok(())
    }

    /// Before the warm-up delay of every repetition
    fn on_repetition_start(
        &mut self,
        _ctx: &mut SuiteContext,
        _run: &RunDescriptor,
        _repetition: usize,
    ) -> Result<(), BenchError> {
        Ok(())
    }

    /// After a run completed; `run` carries its statistics and is already
    /// part of [`SuiteContext::terminated_runs`]
    fn on_run_end(&mut self, _ctx: &mut SuiteContext, _run: &RunDescriptor) -> Result<(), BenchError> {
        Ok(())
    }

    /// After the last run of the group
    ///
    /// Also called once after [`Suite::report_error`] when the group failed,
    /// with the runs that terminated before the failure.
    fn on_group_end(&mut self, _ctx: &mut SuiteContext, _group: &str) -> Result<(), BenchError> {
        Ok(())
    }

    /// A group failed. The engine continues with the next group afterwards.
    fn report_error(&mut self, ctx: &mut SuiteContext, group: &str, error: &BenchError) {
        tracing::error!(suite = %ctx.suite_id(), group, "{error}");
    }

    /// Teardown, called once after all groups even if some failed
    fn dispose(&mut self, _ctx: &mut SuiteContext) -> Result<(), BenchError> {
        Ok(())
    }
}

/// What a suite factory receives from the launcher
#[derive(Debug, Clone, Default)]
pub struct SuiteEnv {
    /// Directory holding one subdirectory per suite
    pub output_root: PathBuf,
    /// Configuration forwarded by the front-end
    pub properties: BTreeMap<String, String>,
}

impl SuiteEnv {
    /// Environment writing below `output_root`
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Add a property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Engine state visible to suite hooks
#[derive(Debug)]
pub struct SuiteContext {
    suite_id: String,
    output_dir: PathBuf,
    properties: BTreeMap<String, String>,
    calls_per_repetition: u64,
    repetitions_per_run: usize,
    warmup_delay: Duration,
    pub(crate) current_run: Option<RunDescriptor>,
    pub(crate) terminated_runs: Vec<RunDescriptor>,
    pub(crate) progress: f64,
}

impl SuiteContext {
    /// Context for suite `suite_id`, writing to `<output_root>/<suite_id>`
    pub fn new(suite_id: impl Into<String>, env: &SuiteEnv) -> Self {
        let suite_id = suite_id.into();
        let mut ctx = Self {
            output_dir: env.output_root.join(&suite_id),
            suite_id,
            properties: env.properties.clone(),
            calls_per_repetition: DEFAULT_CALLS_PER_REPETITION,
            repetitions_per_run: DEFAULT_REPETITIONS_PER_RUN,
            warmup_delay: DEFAULT_WARMUP_DELAY,
            current_run: None,
            terminated_runs: Vec::new(),
            progress: 0.0,
        };
        ctx.apply_reserved_properties();
        ctx
    }

    fn apply_reserved_properties(&mut self) {
        if let Some(calls) = self.parsed_property::<u64>(CALLS_PER_REPETITION_KEY) {
            self.set_calls_per_repetition(calls);
        }
        if let Some(repetitions) = self.parsed_property::<usize>(REPETITIONS_PER_RUN_KEY) {
            self.set_repetitions_per_run(repetitions);
        }
        if let Some(ms) = self.parsed_property::<u64>(WARMUP_DELAY_MS_KEY) {
            self.set_warmup_delay(Duration::from_millis(ms));
        }
    }

    fn parsed_property<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        let raw = self.properties.get(key)?;
        match raw.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(key, value = %raw, "ignoring unparsable engine property");
                None
            }
        }
    }

    /// Identifier the suite was registered under
    pub fn suite_id(&self) -> &str {
        &self.suite_id
    }

    /// Directory owned by this suite
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Configuration value for `key`
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Every configuration value forwarded to the suite
    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Invocations timed as one batch
    pub fn calls_per_repetition(&self) -> u64 {
        self.calls_per_repetition
    }

    /// Set the batch size. Zero is ignored and the previous value kept.
    pub fn set_calls_per_repetition(&mut self, calls: u64) {
        if calls > 0 {
            self.calls_per_repetition = calls;
        } else {
            tracing::warn!(suite = %self.suite_id, "ignoring non-positive calls per repetition");
        }
    }

    /// Timed batches per run
    pub fn repetitions_per_run(&self) -> usize {
        self.repetitions_per_run
    }

    /// Set the repetitions per run. Zero is ignored and the previous value kept.
    pub fn set_repetitions_per_run(&mut self, repetitions: usize) {
        if repetitions > 0 {
            self.repetitions_per_run = repetitions;
        } else {
            tracing::warn!(suite = %self.suite_id, "ignoring non-positive repetitions per run");
        }
    }

    /// Pause before every repetition
    pub fn warmup_delay(&self) -> Duration {
        self.warmup_delay
    }

    /// Set the pause before every repetition; zero disables it
    pub fn set_warmup_delay(&mut self, delay: Duration) {
        self.warmup_delay = delay;
    }

    /// The run being executed, `None` outside a run
    pub fn current_run(&self) -> Option<&RunDescriptor> {
        self.current_run.as_ref()
    }

    /// Runs of the current group that completed, in completion order
    pub fn terminated_runs(&self) -> &[RunDescriptor] {
        &self.terminated_runs
    }

    /// Overall progress in percent
    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// Progress formatted for log lines
    pub fn formatted_progress(&self) -> String {
        format_progress(self.progress)
    }

    /// Logical processors of the host
    pub fn available_processors(&self) -> usize {
        host::available_processors()
    }

    /// Recent system load average (0 when unavailable)
    pub fn load_average(&self) -> f64 {
        host::load_average()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_output_dir() {
        let ctx = SuiteContext::new("codec", &SuiteEnv::new("/tmp/out"));

        assert_eq!(ctx.output_dir(), Path::new("/tmp/out/codec"));
        assert_eq!(ctx.calls_per_repetition(), DEFAULT_CALLS_PER_REPETITION);
        assert_eq!(ctx.repetitions_per_run(), DEFAULT_REPETITIONS_PER_RUN);
        assert_eq!(ctx.warmup_delay(), DEFAULT_WARMUP_DELAY);
        assert!(ctx.current_run().is_none());
        assert!(ctx.terminated_runs().is_empty());
    }

    #[test]
    fn test_zero_knobs_are_ignored() {
        let mut ctx = SuiteContext::new("codec", &SuiteEnv::default());

        ctx.set_calls_per_repetition(50);
        ctx.set_calls_per_repetition(0);
        assert_eq!(ctx.calls_per_repetition(), 50);

        ctx.set_repetitions_per_run(3);
        ctx.set_repetitions_per_run(0);
        assert_eq!(ctx.repetitions_per_run(), 3);
    }

    #[test]
    fn test_reserved_properties_seed_knobs() {
        let env = SuiteEnv::new("out")
            .with_property(CALLS_PER_REPETITION_KEY, "250")
            .with_property(REPETITIONS_PER_RUN_KEY, "0")
            .with_property(WARMUP_DELAY_MS_KEY, "5")
            .with_property("server", "localhost");
        let ctx = SuiteContext::new("net", &env);

        assert_eq!(ctx.calls_per_repetition(), 250);
        // Zero is ignored like any other non-positive setting
        assert_eq!(ctx.repetitions_per_run(), DEFAULT_REPETITIONS_PER_RUN);
        assert_eq!(ctx.warmup_delay(), Duration::from_millis(5));
        assert_eq!(ctx.property("server"), Some("localhost"));
    }

    #[test]
    fn test_unparsable_property_is_ignored() {
        let env = SuiteEnv::new("out").with_property(CALLS_PER_REPETITION_KEY, "lots");
        let ctx = SuiteContext::new("net", &env);
        assert_eq!(ctx.calls_per_repetition(), DEFAULT_CALLS_PER_REPETITION);
    }

    #[test]
    fn test_projected_operation_reaches_inner_suite() {
        struct Inner(u32);
        struct Outer {
            inner: Inner,
        }

        let op = Operation::infallible("bump", |s: &mut Inner| s.0 += 1);
        let mut projected: Operation<Outer> = op.project(|o: &mut Outer| &mut o.inner);
        let mut outer = Outer { inner: Inner(0) };

        projected.call(&mut outer).unwrap();
        projected.call(&mut outer).unwrap();
        assert_eq!(projected.name(), "bump");
        assert_eq!(outer.inner.0, 2);
    }
}
