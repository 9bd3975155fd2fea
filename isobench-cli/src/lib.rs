#![warn(missing_docs)]
//! isobench CLI Library
//!
//! Command line front-end for suite binaries. Call `isobench::run()` (or
//! `isobench_cli::run()`) from `main` to get planning, configuration, the
//! process-isolating orchestrator and the worker entry point for every suite
//! registered with `register_suite!`.
//!
//! # Example
//!
//! ```ignore
//! use isobench::prelude::*;
//!
//! register_suite!("collections" => RecordingSuite::new(Collections::default()));
//!
//! fn main() -> anyhow::Result<()> {
//!     isobench_cli::run()
//! }
//! ```

mod config;
mod launcher;
mod orchestrator;
mod planner;
mod relay;

pub use config::*;
pub use launcher::*;
pub use orchestrator::*;
pub use planner::*;
pub use relay::*;

use anyhow::Context;
use chrono::Local;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use isobench_core::{SuiteEnv, SuiteRegistry};
use regex::Regex;
use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// isobench CLI arguments
#[derive(Parser, Debug)]
#[command(name = "isobench")]
#[command(author, version, about = "isobench - process-isolated micro-benchmark suites")]
pub struct Cli {
    /// Optional subcommand; runs the selected suites when absent
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Suites to run, in this order (all registered suites when empty)
    pub suites: Vec<String>,

    /// Output root (a timestamped batch directory is created below it)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Run suites inside this process instead of one child process each
    #[arg(long)]
    pub in_process: bool,

    /// Property forwarded to every suite (repeatable)
    #[arg(short = 'D', value_name = "KEY=VALUE", value_parser = parse_property)]
    pub properties: Vec<(String, String)>,

    /// Pause before every repetition (e.g. "1s", "250ms")
    #[arg(long)]
    pub warmup_delay: Option<String>,

    /// Invocations timed as one batch
    #[arg(long)]
    pub calls: Option<u64>,

    /// Timed batches per run
    #[arg(long)]
    pub repetitions: Option<usize>,

    /// Address space limit of each suite process in MiB (0 = unlimited)
    #[arg(long)]
    pub memory_limit_mb: Option<u64>,

    /// Only run (or list) suites whose identifier matches this regex
    #[arg(long)]
    pub filter: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Internal: run as a worker process (used by the orchestrator)
    #[arg(long = "suite-worker", hide = true, num_args = 4.., value_name = "ARG")]
    pub suite_worker: Option<Vec<String>>,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List registered suites and the properties they require
    List,
    /// Write a commented isobench.toml into the current directory
    Init {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Parse `key=value`; the value may itself contain `=`
fn parse_property(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {s:?}"))?;

    let valid = Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.\-]*$").map_err(|e| e.to_string())?;
    if !valid.is_match(key) {
        return Err(format!("invalid property key {key:?}"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Run the isobench CLI with the process arguments.
/// This is the main entry point for suite binaries.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the isobench CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    init_logging(cli.verbose);

    if let Some(args) = &cli.suite_worker {
        return run_worker_mode(&cli, args);
    }

    let registry = SuiteRegistry::discover();
    let filter = cli
        .filter
        .as_deref()
        .map(Regex::new)
        .transpose()
        .context("invalid --filter pattern")?;

    match cli.command {
        Some(Commands::List) => {
            list_suites(&registry, filter.as_ref());
            Ok(())
        }
        Some(Commands::Init { force }) => {
            let path = init_config(&std::env::current_dir()?, force)?;
            println!("Wrote {}", path.display());
            Ok(())
        }
        None => {
            let config = IsobenchConfig::discover().unwrap_or_default();
            run_suites(&cli, &config, registry, filter.as_ref())
        }
    }
}

/// Install the stderr subscriber; `RUST_LOG` wins over `--verbose`
fn init_logging(verbose: bool) {
    let default = if verbose { "isobench=debug" } else { "isobench=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();
}

/// Run as a worker process re-entered by the orchestrator
fn run_worker_mode(cli: &Cli, args: &[String]) -> anyhow::Result<()> {
    let invocation = WorkerInvocation::parse(args.iter().cloned())?;

    if let Some(limit_mb) = cli.memory_limit_mb {
        if let Err(e) = apply_memory_limit(limit_mb) {
            warn!(limit_mb, "cannot apply memory limit: {e}");
        }
    }

    let env = SuiteEnv {
        output_root: invocation.output_dir.clone(),
        properties: cli.properties.iter().cloned().collect(),
    };
    let registry = SuiteRegistry::discover();
    let results = launch_suites(&registry, &env, invocation.window, &invocation.suites);

    let aborted: Vec<String> = results
        .iter()
        .filter_map(|r| r.outcome.as_ref().err().map(|e| format!("{}: {e}", r.suite)))
        .collect();
    if aborted.is_empty() {
        Ok(())
    } else {
        Err(anyhow::anyhow!("suite aborted: {}", aborted.join("; ")))
    }
}

fn list_suites(registry: &SuiteRegistry, filter: Option<&Regex>) {
    println!("isobench suites:");

    let mut total = 0;
    for def in registry
        .iter()
        .filter(|def| filter.is_none_or(|re| re.is_match(def.id)))
    {
        match def.description {
            Some(description) => println!("├── {} - {}", def.id, description),
            None => println!("├── {}", def.id),
        }
        if !def.requires.is_empty() {
            println!("│   requires: {}", def.requires.join(", "));
        }
        total += 1;
    }

    println!("{} suites found.", total);
}

/// Write the default configuration into `dir`
fn init_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    let path = dir.join(CONFIG_FILE);
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to replace it)", path.display());
    }
    std::fs::write(&path, IsobenchConfig::default_toml())
        .with_context(|| format!("cannot write {}", path.display()))?;
    Ok(path)
}

/// Layer `isobench.toml` and command line into engine settings
fn engine_settings(cli: &Cli, config: &IsobenchConfig) -> anyhow::Result<EngineSettings> {
    let warmup = cli
        .warmup_delay
        .as_deref()
        .unwrap_or(&config.engine.warmup_delay);
    let warmup_ns = IsobenchConfig::parse_duration(warmup)
        .with_context(|| format!("invalid warm-up delay {warmup:?}"))?;
    // Suites receive the delay in whole milliseconds
    if warmup_ns % 1_000_000 != 0 {
        anyhow::bail!("warm-up delay {warmup:?} is not a whole number of milliseconds");
    }

    Ok(EngineSettings {
        calls_per_repetition: cli.calls.unwrap_or(config.engine.calls_per_repetition),
        repetitions_per_run: cli.repetitions.unwrap_or(config.engine.repetitions_per_run),
        warmup_delay: Duration::from_nanos(warmup_ns),
    })
}

/// Properties seen by suites: `[properties]`, then engine settings, then `-D`
fn suite_properties(
    cli: &Cli,
    config: &IsobenchConfig,
    settings: &EngineSettings,
) -> BTreeMap<String, String> {
    let mut properties = config.property_map();
    properties.extend(settings.to_properties());
    properties.extend(cli.properties.iter().cloned());
    properties
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

fn run_suites(
    cli: &Cli,
    config: &IsobenchConfig,
    registry: SuiteRegistry,
    filter: Option<&Regex>,
) -> anyhow::Result<()> {
    let plan = build_plan(&registry, &cli.suites, filter)?;
    if plan.suites.is_empty() {
        println!("No suites found.");
        return Ok(());
    }

    let settings = engine_settings(cli, config)?;
    let properties = suite_properties(cli, config, &settings);
    plan.check_properties(&properties)?;

    let isolated = !cli.in_process && config.runner.isolation.is_isolated();
    let relay_grace = IsobenchConfig::parse_duration(&config.runner.relay_grace)
        .context("invalid runner.relay_grace")?;
    let output_root = resolve_output_root(cli.output.as_deref(), &config.output, Local::now());
    std::fs::create_dir_all(&output_root)
        .with_context(|| format!("cannot create {}", output_root.display()))?;
    let output_root = output_root.canonicalize().unwrap_or(output_root);

    let ids = plan.ids();
    println!(
        "Running {} suite(s){}...",
        ids.len(),
        if isolated { " (isolated)" } else { " (in-process)" }
    );
    debug!(?settings, "engine settings");

    let orchestrator = ProcessOrchestrator::new(
        OrchestratorConfig {
            isolated,
            memory_limit_mb: cli.memory_limit_mb.unwrap_or(config.runner.memory_limit_mb),
            relay_grace: Duration::from_nanos(relay_grace),
            properties,
            verbose: cli.verbose,
            executable: None,
        },
        registry,
    )?
    .with_progress_bar(progress_bar());

    let report = orchestrator.run(&ids, &output_root);

    let failed = report.failed_count();
    if failed > 0 {
        anyhow::bail!("{} of {} suite(s) did not complete", failed, report.suites.len());
    }
    Ok(())
}
