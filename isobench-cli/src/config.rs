//! Configuration loading from isobench.toml
//!
//! isobench configuration can be specified in an `isobench.toml` file in the project root.
//! The configuration is automatically discovered by walking up from the current directory.
//! Command line flags override every value read from the file.

use chrono::{DateTime, Local};
use isobench_core::{
    CALLS_PER_REPETITION_KEY, DEFAULT_CALLS_PER_REPETITION, DEFAULT_REPETITIONS_PER_RUN,
    REPETITIONS_PER_RUN_KEY, WARMUP_DELAY_MS_KEY,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the configuration file looked up by [`IsobenchConfig::discover`]
pub const CONFIG_FILE: &str = "isobench.toml";

/// Directory created below the temp directory when no output root is chosen
pub const DEFAULT_OUTPUT_DIR_NAME: &str = "isobench";

/// isobench configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IsobenchConfig {
    /// Runner configuration
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Engine knobs forwarded to every suite
    #[serde(default)]
    pub engine: EngineConfig,
    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,
    /// Free key/value configuration visible to suites
    #[serde(default)]
    pub properties: BTreeMap<String, toml::Value>,
}

/// Isolation mode for suite execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationMode {
    /// Run each suite in a dedicated child process (default)
    #[default]
    Process,
    /// Run suites in the orchestrator's process (debugging)
    InProcess,
}

impl IsolationMode {
    /// Whether this mode provides process isolation
    pub fn is_isolated(self) -> bool {
        matches!(self, IsolationMode::Process)
    }
}

/// Runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Isolation mode: "process" or "in-process"
    #[serde(default)]
    pub isolation: IsolationMode,
    /// Address space limit of each child process in MiB (0 = unlimited)
    #[serde(default = "default_memory_limit_mb")]
    pub memory_limit_mb: u64,
    /// How long relays may keep draining output after the child exits (e.g., "2s")
    #[serde(default = "default_relay_grace")]
    pub relay_grace: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            isolation: IsolationMode::default(),
            memory_limit_mb: default_memory_limit_mb(),
            relay_grace: default_relay_grace(),
        }
    }
}

fn default_memory_limit_mb() -> u64 {
    1024
}
fn default_relay_grace() -> String {
    "2s".to_string()
}

/// Engine knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Invocations timed as one batch
    #[serde(default = "default_calls_per_repetition")]
    pub calls_per_repetition: u64,
    /// Timed batches per run
    #[serde(default = "default_repetitions_per_run")]
    pub repetitions_per_run: usize,
    /// Pause before every repetition (e.g., "1s", "0ms")
    #[serde(default = "default_warmup_delay")]
    pub warmup_delay: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            calls_per_repetition: default_calls_per_repetition(),
            repetitions_per_run: default_repetitions_per_run(),
            warmup_delay: default_warmup_delay(),
        }
    }
}

fn default_calls_per_repetition() -> u64 {
    DEFAULT_CALLS_PER_REPETITION
}
fn default_repetitions_per_run() -> usize {
    DEFAULT_REPETITIONS_PER_RUN
}
fn default_warmup_delay() -> String {
    "1s".to_string()
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output root (temp directory based when unset)
    #[serde(default)]
    pub directory: Option<String>,
    /// Write each batch into a `yyyyMMdd-HHmmss` subdirectory
    #[serde(default = "default_timestamped")]
    pub timestamped: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: None,
            timestamped: default_timestamped(),
        }
    }
}

fn default_timestamped() -> bool {
    true
}

impl IsobenchConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Try to discover and load configuration by walking up from current directory
    pub fn discover() -> Option<Self> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.exists() {
                return match Self::load(&config_path) {
                    Ok(config) => Some(config),
                    Err(e) => {
                        eprintln!(
                            "isobench: warning: ignoring {}: {e}",
                            config_path.display()
                        );
                        None
                    }
                };
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }

    /// `[properties]` rendered as strings
    pub fn property_map(&self) -> BTreeMap<String, String> {
        self.properties
            .iter()
            .map(|(key, value)| {
                let rendered = match value {
                    toml::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), rendered)
            })
            .collect()
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# isobench configuration

[runner]
# Isolation mode: "process" or "in-process"
isolation = "process"
# Address space limit of each suite process in MiB (0 = unlimited)
memory_limit_mb = 1024
# Time relays keep draining child output after it exits
relay_grace = "2s"

[engine]
# Invocations timed as one batch
calls_per_repetition = 100000
# Timed batches per run
repetitions_per_run = 10
# Pause before every repetition
warmup_delay = "1s"

[output]
# Output root (defaults to $TEMP/isobench, $TMP/isobench or the platform temp dir)
# directory = "target/isobench"
# One yyyyMMdd-HHmmss subdirectory per batch
timestamped = true

[properties]
# Forwarded to every suite, e.g.
# "net.host" = "localhost"
"#
        .to_string()
    }

    /// Parse duration string (e.g., "3s", "500ms", "2m") to nanoseconds
    pub fn parse_duration(s: &str) -> anyhow::Result<u64> {
        let s = s.trim();
        if s.is_empty() {
            return Err(anyhow::anyhow!("Empty duration string"));
        }

        // Find where the number ends and unit begins
        let (num_part, unit_part) = s
            .char_indices()
            .find(|(_, c)| c.is_alphabetic())
            .map(|(i, _)| s.split_at(i))
            .unwrap_or((s, "s"));

        let value: f64 = num_part
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid duration number: {}", num_part))?;
        if value < 0.0 {
            return Err(anyhow::anyhow!("Negative duration: {}", s));
        }

        let multiplier: u64 = match unit_part.to_lowercase().as_str() {
            "ns" => 1,
            "us" | "µs" => 1_000,
            "ms" => 1_000_000,
            "s" | "" => 1_000_000_000,
            "m" | "min" => 60_000_000_000,
            _ => return Err(anyhow::anyhow!("Unknown duration unit: {}", unit_part)),
        };

        Ok((value * multiplier as f64) as u64)
    }
}

/// Engine settings after layering isobench.toml and command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Invocations timed as one batch
    pub calls_per_repetition: u64,
    /// Timed batches per run
    pub repetitions_per_run: usize,
    /// Pause before every repetition
    pub warmup_delay: Duration,
}

impl EngineSettings {
    /// Reserved properties carrying these settings to suites and child processes
    pub fn to_properties(&self) -> BTreeMap<String, String> {
        let mut props = BTreeMap::new();
        props.insert(
            CALLS_PER_REPETITION_KEY.to_string(),
            self.calls_per_repetition.to_string(),
        );
        props.insert(
            REPETITIONS_PER_RUN_KEY.to_string(),
            self.repetitions_per_run.to_string(),
        );
        props.insert(
            WARMUP_DELAY_MS_KEY.to_string(),
            self.warmup_delay.as_millis().to_string(),
        );
        props
    }
}

/// Output root when neither the command line nor the file chooses one:
/// `$TEMP`, then `$TMP`, then the platform temp directory, joined with `isobench`
pub fn default_output_root() -> PathBuf {
    output_root_from(|key| std::env::var_os(key))
}

fn output_root_from(lookup: impl Fn(&str) -> Option<std::ffi::OsString>) -> PathBuf {
    let base = ["TEMP", "TMP"]
        .into_iter()
        .filter_map(|key| lookup(key))
        .find(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir);
    base.join(DEFAULT_OUTPUT_DIR_NAME)
}

/// Resolve the directory a batch writes into
pub fn resolve_output_root(
    explicit: Option<&Path>,
    config: &OutputConfig,
    started: DateTime<Local>,
) -> PathBuf {
    let root = explicit
        .map(Path::to_path_buf)
        .or_else(|| config.directory.as_ref().map(PathBuf::from))
        .unwrap_or_else(default_output_root);

    if config.timestamped {
        root.join(started.format("%Y%m%d-%H%M%S").to_string())
    } else {
        root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::ffi::OsString;

    #[test]
    fn test_default_config() {
        let config = IsobenchConfig::default();
        assert!(config.runner.isolation.is_isolated());
        assert_eq!(config.runner.memory_limit_mb, 1024);
        assert_eq!(config.engine.calls_per_repetition, 100_000);
        assert_eq!(config.engine.repetitions_per_run, 10);
        assert_eq!(config.engine.warmup_delay, "1s");
        assert!(config.output.timestamped);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(IsobenchConfig::parse_duration("3s").unwrap(), 3_000_000_000);
        assert_eq!(IsobenchConfig::parse_duration("500ms").unwrap(), 500_000_000);
        assert_eq!(IsobenchConfig::parse_duration("100us").unwrap(), 100_000);
        assert_eq!(IsobenchConfig::parse_duration("1000ns").unwrap(), 1000);
        assert_eq!(IsobenchConfig::parse_duration("2m").unwrap(), 120_000_000_000);
        assert_eq!(IsobenchConfig::parse_duration("1.5s").unwrap(), 1_500_000_000);
        assert_eq!(IsobenchConfig::parse_duration("0ms").unwrap(), 0);
        assert!(IsobenchConfig::parse_duration("").is_err());
        assert!(IsobenchConfig::parse_duration("5h").is_err());
        assert!(IsobenchConfig::parse_duration("-1s").is_err());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            [runner]
            isolation = "in-process"
            memory_limit_mb = 0

            [engine]
            repetitions_per_run = 3

            [properties]
            "net.host" = "localhost"
            "net.port" = 8080
        "#;

        let config: IsobenchConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.runner.isolation, IsolationMode::InProcess);
        assert_eq!(config.runner.memory_limit_mb, 0);
        assert_eq!(config.engine.repetitions_per_run, 3);
        // Defaults should still apply
        assert_eq!(config.engine.calls_per_repetition, 100_000);
        assert_eq!(config.runner.relay_grace, "2s");

        let props = config.property_map();
        assert_eq!(props["net.host"], "localhost");
        assert_eq!(props["net.port"], "8080");
    }

    #[test]
    fn test_default_toml_parses() {
        let config: IsobenchConfig = toml::from_str(&IsobenchConfig::default_toml()).unwrap();
        assert_eq!(config.engine.warmup_delay, "1s");
        assert!(config.properties.is_empty());
    }

    #[test]
    fn test_engine_settings_as_properties() {
        let settings = EngineSettings {
            calls_per_repetition: 10,
            repetitions_per_run: 2,
            warmup_delay: Duration::from_millis(250),
        };
        let props = settings.to_properties();
        assert_eq!(props[CALLS_PER_REPETITION_KEY], "10");
        assert_eq!(props[REPETITIONS_PER_RUN_KEY], "2");
        assert_eq!(props[WARMUP_DELAY_MS_KEY], "250");
    }

    #[test]
    fn test_temp_lookup_order() {
        let both = |key: &str| match key {
            "TEMP" => Some(OsString::from("/primary")),
            "TMP" => Some(OsString::from("/secondary")),
            _ => None,
        };
        assert_eq!(output_root_from(both), PathBuf::from("/primary/isobench"));

        let secondary = |key: &str| (key == "TMP").then(|| OsString::from("/secondary"));
        assert_eq!(output_root_from(secondary), PathBuf::from("/secondary/isobench"));

        let none = |_: &str| None;
        assert_eq!(output_root_from(none), std::env::temp_dir().join("isobench"));
    }

    #[test]
    fn test_resolve_output_root() {
        let started = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let config = OutputConfig {
            directory: Some("/data/bench".into()),
            timestamped: true,
        };

        assert_eq!(
            resolve_output_root(None, &config, started),
            PathBuf::from("/data/bench/20240309-140507")
        );
        assert_eq!(
            resolve_output_root(
                Some(Path::new("/cli")),
                &OutputConfig {
                    timestamped: false,
                    ..config
                },
                started
            ),
            PathBuf::from("/cli")
        );
    }
}
