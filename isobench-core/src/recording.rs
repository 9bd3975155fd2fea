//! Recording Suites
//!
//! [`RecordingSuite`] wraps a [`RecordedSuite`] and persists its results into
//! the suite's output directory:
//! - `<group>.tsv`: opened fresh at group start with the optional title and
//!   the header comment lines, one data row per record, closed at group end
//! - `<group>.log`: written when the group fails (message, causes, backtrace);
//!   the runs that terminated before the failure still get their rows
//!
//! Records are flushed row by row, so an isolated worker that dies keeps every
//! row written before the crash.

use crate::error::BenchError;
use crate::run::RunDescriptor;
use crate::suite::{Operation, Suite, SuiteContext};
use isobench_report::{
    ERROR_EXTENSION, RECORD_EXTENSION, RecordWriter, ReportError, write_error_file,
};
use std::fmt::Display;
use std::path::PathBuf;
use tracing::{debug, error};

/// Columns written by [`GroupRecorder::write_standard_rows`]
pub const STANDARD_COLUMNS: [&str; 6] = [
    "Order",
    "Name",
    "Global Duration (ns)",
    "Operation Duration (ns)",
    "Operation Standard Deviation",
    "OS Load Average",
];

/// [`STANDARD_COLUMNS`] as owned header names
pub fn standard_headers() -> Vec<String> {
    STANDARD_COLUMNS.iter().map(|c| c.to_string()).collect()
}

/// The record file of the group being executed
#[derive(Default)]
pub struct GroupRecorder {
    writer: Option<RecordWriter>,
}

impl GroupRecorder {
    fn open(&mut self, path: PathBuf, title: Option<&str>, headers: &[String]) -> Result<(), BenchError> {
        self.close()?;
        self.writer = Some(RecordWriter::create(&path, title, headers)?);
        debug!(path = %path.display(), "opened record file");
        Ok(())
    }

    fn close(&mut self) -> Result<(), BenchError> {
        if let Some(writer) = self.writer.take() {
            writer.finish()?;
        }
        Ok(())
    }

    /// Whether a record file is open
    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    /// Rows written to the current file
    pub fn rows_written(&self) -> usize {
        self.writer.as_ref().map_or(0, RecordWriter::rows_written)
    }

    /// Append one tab-separated row and flush it
    pub fn write_record<I, T>(&mut self, columns: I) -> Result<(), BenchError>
    where
        I: IntoIterator<Item = T>,
        T: Display,
    {
        let writer = self.writer.as_mut().ok_or(ReportError::NotOpen)?;
        writer.write_record(columns)?;
        Ok(())
    }

    /// One row per terminated run of the group, in [`STANDARD_COLUMNS`] layout
    pub fn write_standard_rows(&mut self, ctx: &SuiteContext) -> Result<(), BenchError> {
        let load = ctx.load_average();
        for (order, run) in ctx.terminated_runs().iter().enumerate() {
            self.write_record([
                order.to_string(),
                run.name().to_string(),
                run.run_duration().to_string(),
                run.call_average_duration().to_string(),
                format!("{:.3}", run.call_standard_deviation()),
                format!("{load:.2}"),
            ])?;
        }
        Ok(())
    }
}

/// A suite whose results are written to record files
///
/// Mirrors [`Suite`], with the record file of the current group handed to the
/// end-of-run and end-of-group hooks. The defaults produce one run per group
/// and one [`STANDARD_COLUMNS`] row per run.
pub trait RecordedSuite: Sized + 'static {
    /// Title comment line of every record file
    fn title(&self) -> Option<String> {
        None
    }

    /// Column names; no header lines are written when empty
    fn headers(&self) -> Vec<String> {
        standard_headers()
    }

    /// See [`Suite::initialize`]
    fn initialize(&mut self, _ctx: &mut SuiteContext) -> Result<(), BenchError> {
        Ok(())
    }

    /// Operation groups in execution order
    fn operations(&self) -> Vec<Operation<Self>>;

    /// Runs exercised for `group`
    fn determine_runs(
        &mut self,
        _ctx: &mut SuiteContext,
        group: &str,
    ) -> Result<Vec<RunDescriptor>, BenchError> {
        Ok(vec![RunDescriptor::new(group)])
    }

    /// See [`Suite::on_run_start`]
    fn on_run_start(&mut self, _ctx: &mut SuiteContext, _run: &RunDescriptor) -> Result<(), BenchError> {
        Ok(())
    }

    /// See [`Suite::on_repetition_start`]
    fn on_repetition_start(
        &mut self,
        _ctx: &mut SuiteContext,
        _run: &RunDescriptor,
        _repetition: usize,
    ) -> Result<(), BenchError> {
        Ok(())
    }

    /// A run completed; custom layouts write its row here
    fn on_run_end(
        &mut self,
        _ctx: &mut SuiteContext,
        _run: &RunDescriptor,
        _records: &mut GroupRecorder,
    ) -> Result<(), BenchError> {
        Ok(())
    }

    /// Write the rows of the finished group
    fn on_group_end(
        &mut self,
        ctx: &mut SuiteContext,
        _group: &str,
        records: &mut GroupRecorder,
    ) -> Result<(), BenchError> {
        records.write_standard_rows(ctx)
    }

    /// See [`Suite::dispose`]
    fn dispose(&mut self, _ctx: &mut SuiteContext) -> Result<(), BenchError> {
        Ok(())
    }
}

/// [`Suite`] adapter persisting a [`RecordedSuite`]
pub struct RecordingSuite<R: RecordedSuite> {
    inner: R,
    records: GroupRecorder,
}

impl<R: RecordedSuite> RecordingSuite<R> {
    /// Persist the results of `inner`
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            records: GroupRecorder::default(),
        }
    }

    /// The wrapped suite
    pub fn inner(&self) -> &R {
        &self.inner
    }

    fn inner_mut(&mut self) -> &mut R {
        &mut self.inner
    }
}

impl<R: RecordedSuite> Suite for RecordingSuite<R> {
    fn initialize(&mut self, ctx: &mut SuiteContext) -> Result<(), BenchError> {
        self.inner.initialize(ctx)
    }

    fn operations(&self) -> Vec<Operation<Self>> {
        self.inner
            .operations()
            .into_iter()
            .map(|op| op.project(Self::inner_mut))
            .collect()
    }

    fn on_group_start(
        &mut self,
        ctx: &mut SuiteContext,
        group: &str,
    ) -> Result<Vec<RunDescriptor>, BenchError> {
        let path = ctx.output_dir().join(format!("{group}.{RECORD_EXTENSION}"));
        let title = self.inner.title();
        let headers = self.inner.headers();
        self.records.open(path, title.as_deref(), &headers)?;
        self.inner.determine_runs(ctx, group)
    }

    fn on_run_start(&mut self, ctx: &mut SuiteContext, run: &RunDescriptor) -> Result<(), BenchError> {
        self.inner.on_run_start(ctx, run)
    }

    fn on_repetition_start(
        &mut self,
        ctx: &mut SuiteContext,
        run: &RunDescriptor,
        repetition: usize,
    ) -> Result<(), BenchError> {
        self.inner.on_repetition_start(ctx, run, repetition)
    }

    fn on_run_end(&mut self, ctx: &mut SuiteContext, run: &RunDescriptor) -> Result<(), BenchError> {
        self.inner.on_run_end(ctx, run, &mut self.records)
    }

    fn on_group_end(&mut self, ctx: &mut SuiteContext, group: &str) -> Result<(), BenchError> {
        let written = self.inner.on_group_end(ctx, group, &mut self.records);
        let closed = self.records.close();
        written?;
        closed
    }

    fn report_error(&mut self, ctx: &mut SuiteContext, group: &str, err: &BenchError) {
        error!(suite = %ctx.suite_id(), group, "{err}");

        let path = ctx.output_dir().join(format!("{group}.{ERROR_EXTENSION}"));
        if let Err(write_err) = write_error_file(&path, err, err.backtrace()) {
            debug!(path = %path.display(), "writing error file failed: {write_err}");
        }
    }

    fn dispose(&mut self, ctx: &mut SuiteContext) -> Result<(), BenchError> {
        let closed = self.records.close();
        self.inner.dispose(ctx)?;
        closed
    }
}
