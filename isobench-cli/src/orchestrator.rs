//! Process Orchestrator
//!
//! Dispatches the suites of a batch strictly one after the other. Each suite
//! owns `100 / N` percent of overall progress. In isolated mode every suite
//! runs in a fresh child process (this executable re-entered in worker mode)
//! whose stdout and stderr are relayed by two tasks on a two-thread pool that
//! is built once and reused for every suite, unless a relay got stuck.
//!
//! A suite that cannot be launched, fails fatally or exits non-zero is
//! recorded as such and the batch moves on, so progress always reaches 100.

use crate::launcher::{WORKER_FLAG, WorkerInvocation, launch_suites};
use crate::relay::{RelayPool, SuspendingWriter};
use indicatif::ProgressBar;
use isobench_core::{ProgressWindow, SuiteEnv, SuiteRegistry, available_processors, load_average};
use isobench_report::{BatchReport, HostInfo, SuiteOutcome, SuiteStatus};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Relays running per isolated suite: stdout and stderr
pub const RELAY_THREADS: usize = 2;

/// Errors raised while dispatching a suite
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The worker process could not be started or waited for
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(#[from] std::io::Error),

    /// The output relays could not be set up
    #[error("Relay error: {0}")]
    Relay(String),

    /// The worker exited unsuccessfully
    #[error("Worker for suite '{suite}' failed: {status}")]
    WorkerFailed {
        /// Suite the worker ran
        suite: String,
        /// Exit status of the worker
        status: ExitStatus,
    },
}

/// How the orchestrator dispatches suites
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Run every suite in its own child process
    pub isolated: bool,
    /// Address space limit passed to each child (0 = unlimited)
    pub memory_limit_mb: u64,
    /// Drain time for relays once a child exited
    pub relay_grace: Duration,
    /// Configuration forwarded to suites (`-D key=value` for children)
    pub properties: BTreeMap<String, String>,
    /// Forward `--verbose` to children
    pub verbose: bool,
    /// Worker executable; the current executable when unset
    pub executable: Option<PathBuf>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            isolated: true,
            memory_limit_mb: 1024,
            relay_grace: Duration::from_secs(2),
            properties: BTreeMap::new(),
            verbose: false,
            executable: None,
        }
    }
}

/// Child process killed when dropped while still running
struct WorkerProcess {
    child: Child,
}

impl WorkerProcess {
    fn spawn(command: &mut Command) -> Result<Self, OrchestratorError> {
        Ok(Self {
            child: command.spawn()?,
        })
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn wait(&mut self) -> Result<ExitStatus, OrchestratorError> {
        Ok(self.child.wait()?)
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        if self.is_alive() {
            warn!(pid = self.child.id(), "killing worker process");
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Sequences the suites of a batch
pub struct ProcessOrchestrator {
    config: OrchestratorConfig,
    registry: SuiteRegistry,
    relays: Mutex<RelayPool>,
    progress: ProgressBar,
}

impl ProcessOrchestrator {
    /// Create an orchestrator and its relay pool
    pub fn new(config: OrchestratorConfig, registry: SuiteRegistry) -> Result<Self, OrchestratorError> {
        let relays = RelayPool::new(RELAY_THREADS)
            .map_err(|e| OrchestratorError::Relay(format!("Failed to build relay pool: {}", e)))?;

        Ok(Self {
            config,
            registry,
            relays: Mutex::new(relays),
            progress: ProgressBar::hidden(),
        })
    }

    /// Drive `bar` over 0..100 while the batch runs
    pub fn with_progress_bar(mut self, bar: ProgressBar) -> Self {
        self.progress = bar;
        self
    }

    /// Run `suites` in order, writing below `output_root`
    pub fn run(&self, suites: &[String], output_root: &Path) -> BatchReport {
        println!("Output directory: {}", output_root.display());

        let host = HostInfo {
            processors: available_processors(),
            load_average: load_average(),
        };
        let mut report = BatchReport::new(output_root, self.config.isolated, host);

        let mut accumulated = 0.0;
        self.progress.set_position(0);
        for (id, window) in suites.iter().zip(ProgressWindow::FULL.split(suites.len())) {
            self.progress.set_message(id.clone());
            let started = Instant::now();

            let mut outcome = if self.config.isolated {
                self.run_isolated(id, window, output_root)
            } else {
                self.run_in_process(id, window, output_root)
            };
            outcome.elapsed_ms = started.elapsed().as_millis() as u64;
            report.suites.push(outcome);

            accumulated += window.size;
            self.progress.set_position(accumulated.round() as u64);
        }
        self.progress.set_position(100);
        self.progress.finish_with_message("done");

        match report.finish_and_write() {
            Ok(path) => debug!(path = %path.display(), "batch report written"),
            Err(e) => warn!("failed to write batch report: {e}"),
        }
        println!("Results written to {}", output_root.display());
        report
    }

    fn outcome(id: &str, window: ProgressWindow, status: SuiteStatus) -> SuiteOutcome {
        SuiteOutcome {
            suite: id.to_string(),
            progress_start: window.start,
            progress_size: window.size,
            status,
            exit_code: None,
            message: None,
            elapsed_ms: 0,
        }
    }

    fn run_in_process(&self, id: &str, window: ProgressWindow, output_root: &Path) -> SuiteOutcome {
        let env = SuiteEnv {
            output_root: output_root.to_path_buf(),
            properties: self.config.properties.clone(),
        };

        let results = self
            .progress
            .suspend(|| launch_suites(&self.registry, &env, window, &[id.to_string()]));

        let mut outcome = Self::outcome(id, window, SuiteStatus::Completed);
        if let Some(Err(e)) = results.into_iter().next().map(|r| r.outcome) {
            outcome.status = SuiteStatus::Failed;
            outcome.message = Some(e.to_string());
        }
        outcome
    }

    fn run_isolated(&self, id: &str, window: ProgressWindow, output_root: &Path) -> SuiteOutcome {
        let mut outcome = Self::outcome(id, window, SuiteStatus::LaunchFailed);

        let mut command = match self.worker_command(id, window, output_root) {
            Ok(command) => command,
            Err(e) => {
                error!(suite = %id, "cannot build worker command: {e}");
                outcome.message = Some(e.to_string());
                return outcome;
            }
        };

        match self.supervise(id, &mut command) {
            Ok(status) if status.success() => {
                outcome.status = SuiteStatus::Completed;
                outcome.exit_code = status.code();
            }
            Ok(status) => {
                let err = OrchestratorError::WorkerFailed {
                    suite: id.to_string(),
                    status,
                };
                error!(suite = %id, "{err}");
                outcome.status = SuiteStatus::Failed;
                outcome.exit_code = status.code();
                outcome.message = Some(err.to_string());
            }
            Err(e) => {
                error!(suite = %id, "worker setup failed, killing: {e}");
                outcome.message = Some(e.to_string());
            }
        }
        outcome
    }

    /// Command line re-entering this executable as a worker for `id`
    pub fn worker_command(
        &self,
        id: &str,
        window: ProgressWindow,
        output_root: &Path,
    ) -> Result<Command, OrchestratorError> {
        let executable = match &self.config.executable {
            Some(path) => path.clone(),
            None => env::current_exe()?,
        };

        let mut command = Command::new(executable);
        for (key, value) in &self.config.properties {
            command.arg("-D").arg(format!("{key}={value}"));
        }
        if self.config.verbose {
            command.arg("--verbose");
        }
        command
            .arg("--memory-limit-mb")
            .arg(self.config.memory_limit_mb.to_string())
            .arg(WORKER_FLAG);

        let invocation = WorkerInvocation {
            output_dir: output_root.to_path_buf(),
            window,
            suites: vec![id.to_string()],
        };
        command.args(invocation.to_args());
        Ok(command)
    }

    /// Launch the worker, relay its output and wait for it to exit
    fn supervise(&self, id: &str, command: &mut Command) -> Result<ExitStatus, OrchestratorError> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        info!(suite = %id, "launching {:?}", command);

        let mut worker = WorkerProcess::spawn(command)?;
        let stdout = worker
            .child
            .stdout
            .take()
            .ok_or_else(|| OrchestratorError::Relay("child stdout not captured".to_string()))?;
        let stderr = worker
            .child
            .stderr
            .take()
            .ok_or_else(|| OrchestratorError::Relay("child stderr not captured".to_string()))?;

        #[cfg(unix)]
        let (stdout, stderr) = {
            use crate::relay::PipeSource;
            let non_blocking =
                |e: std::io::Error| OrchestratorError::Relay(format!("Failed to poll worker pipe: {e}"));
            (
                PipeSource::new(stdout).map_err(non_blocking)?,
                PipeSource::new(stderr).map_err(non_blocking)?,
            )
        };

        let mut relays = self.relays.lock().unwrap_or_else(PoisonError::into_inner);
        let running = vec![
            relays.start(
                "stdout",
                stdout,
                SuspendingWriter::new(self.progress.clone(), std::io::stdout()),
            ),
            relays.start(
                "stderr",
                stderr,
                SuspendingWriter::new(self.progress.clone(), std::io::stderr()),
            ),
        ];

        let status = worker.wait();
        relays.stop_all(running, self.config.relay_grace);

        let status = status?;
        debug!(suite = %id, %status, "worker exited");
        Ok(status)
    }
}
