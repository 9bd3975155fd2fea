//! Integration tests for isobench
//!
//! These tests drive whole suites in-process, from registration to the files
//! left in the output root.

use isobench::prelude::*;
use isobench::{
    BatchReport, OrchestratorConfig, ProcessOrchestrator, ProgressWindow, STANDARD_COLUMNS,
    SuiteEnv, SuiteRegistry, SuiteStatus, launch_suites, read_records,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Sums a counter, sized by the `counter.step` property
#[derive(Default)]
struct Counter {
    step: u64,
    total: u64,
}

impl RecordedSuite for Counter {
    fn title(&self) -> Option<String> {
        Some("Counter".into())
    }

    fn initialize(&mut self, ctx: &mut SuiteContext) -> Result<(), BenchError> {
        self.step = ctx
            .property("counter.step")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1);
        ctx.set_calls_per_repetition(20);
        ctx.set_repetitions_per_run(3);
        ctx.set_warmup_delay(Duration::ZERO);
        Ok(())
    }

    fn operations(&self) -> Vec<Operation<Self>> {
        vec![
            Operation::infallible("add", |c: &mut Counter| {
                c.total = std::hint::black_box(c.total + c.step)
            }),
            Operation::infallible("panics", |_: &mut Counter| panic!("counter overflow")),
            Operation::new("refuses", |_: &mut Counter| Err(BenchError::msg("refused"))),
            Operation::infallible("sub", |c: &mut Counter| {
                c.total = std::hint::black_box(c.total.saturating_sub(c.step))
            }),
        ]
    }

    fn determine_runs(
        &mut self,
        _ctx: &mut SuiteContext,
        group: &str,
    ) -> Result<Vec<RunDescriptor>, BenchError> {
        Ok(vec![
            RunDescriptor::new(format!("{group}-raw")),
            RunDescriptor::new(format!("{group}-corrected")).with_time_scaling(0.5, -10),
        ])
    }
}

/// Fails before any group runs
struct Unreachable;

impl Suite for Unreachable {
    fn initialize(&mut self, _ctx: &mut SuiteContext) -> Result<(), BenchError> {
        Err(BenchError::msg("endpoint unreachable"))
    }

    fn operations(&self) -> Vec<Operation<Self>> {
        vec![Operation::infallible("never", |_: &mut Unreachable| {})]
    }
}

register_suite!("counter" => RecordingSuite::new(Counter::default()),
    description = "Counter arithmetic",
    requires = ["counter.step"]);

register_suite!("unreachable" => Unreachable);

fn in_process(properties: BTreeMap<String, String>) -> ProcessOrchestrator {
    ProcessOrchestrator::new(
        OrchestratorConfig {
            isolated: false,
            properties,
            ..OrchestratorConfig::default()
        },
        SuiteRegistry::discover(),
    )
    .unwrap()
}

fn read_group(root: &Path, suite: &str, group: &str) -> isobench::RecordFile {
    read_records(root.join(suite).join(format!("{group}.tsv"))).unwrap()
}

#[test]
fn test_registry_discovers_suites() {
    let registry = SuiteRegistry::discover();
    assert_eq!(registry.ids(), vec!["counter", "unreachable"]);

    let counter = registry.get("counter").unwrap();
    assert_eq!(counter.description, Some("Counter arithmetic"));
    assert_eq!(counter.requires, &["counter.step"]);
}

#[test]
fn test_failing_groups_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let env = SuiteEnv::new(dir.path()).with_property("counter.step", "2");

    let results = launch_suites(
        &SuiteRegistry::discover(),
        &env,
        ProgressWindow::FULL,
        &["counter".to_string()],
    );
    let summary = results[0].outcome.as_ref().unwrap();
    assert_eq!(summary.completed_groups, vec!["add", "sub"]);
    assert_eq!(summary.failed_groups, vec!["panics", "refuses"]);

    let suite_dir = dir.path().join("counter");
    let panic_log = std::fs::read_to_string(suite_dir.join("panics.log")).unwrap();
    assert!(panic_log.contains("counter overflow"));
    let refused_log = std::fs::read_to_string(suite_dir.join("refuses.log")).unwrap();
    assert!(refused_log.contains("Caused by: refused"));

    // Groups after the failures still produced full record files
    let sub = read_group(dir.path(), "counter", "sub");
    assert_eq!(sub.rows.len(), 2);
}

#[test]
fn test_record_files_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let env = SuiteEnv::new(dir.path()).with_property("counter.step", "1");

    launch_suites(
        &SuiteRegistry::discover(),
        &env,
        ProgressWindow::FULL,
        &["counter".to_string()],
    );

    let add = read_group(dir.path(), "counter", "add");
    assert_eq!(add.title.as_deref(), Some("Counter"));
    assert_eq!(add.headers, STANDARD_COLUMNS.map(String::from).to_vec());
    assert_eq!(add.rows.len(), 2);

    assert_eq!(add.rows[0][0], "0");
    assert_eq!(add.rows[0][1], "add-raw");
    assert_eq!(add.rows[1][0], "1");
    assert_eq!(add.rows[1][1], "add-corrected");

    for row in &add.rows {
        assert_eq!(row.len(), STANDARD_COLUMNS.len());
        let global: i64 = row[2].parse().unwrap();
        let per_call: i64 = row[3].parse().unwrap();
        assert!(global >= 0);
        assert!(per_call >= 0);
        assert!(per_call <= global);
    }
}

#[test]
fn test_batch_continues_after_fatal_suite() {
    let dir = tempfile::tempdir().unwrap();
    let mut properties = BTreeMap::new();
    properties.insert("counter.step".to_string(), "3".to_string());

    let suites = vec!["unreachable".to_string(), "counter".to_string()];
    let report = in_process(properties).run(&suites, dir.path());

    assert_eq!(report.suites.len(), 2);
    assert_eq!(report.suites[0].status, SuiteStatus::Failed);
    assert_eq!(
        report.suites[0].message.as_deref(),
        Some("Suite 'unreachable' failed to initialize")
    );
    assert_eq!(report.suites[1].status, SuiteStatus::Completed);
    assert_eq!(report.suites[1].progress_start, 50.0);
    assert_eq!(report.failed_count(), 1);

    // The batch report on disk matches the returned one
    let loaded = BatchReport::load(dir.path().join("batch.json")).unwrap();
    assert_eq!(loaded.suites.len(), 2);
    assert!(!loaded.isolated);
    assert!(loaded.finished.is_some());

    assert!(dir.path().join("counter").join("add.tsv").is_file());
}
