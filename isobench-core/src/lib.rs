#![warn(missing_docs)]
//! isobench Core - Suite Engine
//!
//! This crate provides the execution environment for benchmark suites:
//! - `Suite` trait and `Operation` for declaring timed work
//! - `BenchmarkSuite` engine: groups, runs, repetitions, statistics
//! - `RecordingSuite` adapter persisting results as record files
//! - Suite registry filled at link time via `register_suite!`

mod engine;
mod error;
mod host;
mod measure;
mod progress;
mod recording;
mod run;
mod suite;

pub use engine::{BenchmarkSuite, SuiteExecution, SuiteSummary};
pub use error::BenchError;
pub use host::{available_processors, load_average};
pub use measure::Timer;
pub use progress::{ProgressWindow, format_progress};
pub use recording::{
    GroupRecorder, RecordedSuite, RecordingSuite, STANDARD_COLUMNS, standard_headers,
};
pub use run::RunDescriptor;
pub use suite::{
    CALLS_PER_REPETITION_KEY, DEFAULT_CALLS_PER_REPETITION, DEFAULT_REPETITIONS_PER_RUN,
    DEFAULT_WARMUP_DELAY, Operation, REPETITIONS_PER_RUN_KEY, Suite, SuiteContext, SuiteEnv,
    WARMUP_DELAY_MS_KEY,
};

#[doc(hidden)]
pub use inventory;

/// Suite definition registered via `register_suite!`
#[derive(Debug, Clone, Copy)]
pub struct SuiteDef {
    /// Unique identifier, also the name of the suite's output directory
    pub id: &'static str,
    /// Human-readable description
    pub description: Option<&'static str>,
    /// Property keys that must be supplied before the suite can run
    pub requires: &'static [&'static str],
    /// Build a fresh suite instance
    pub factory: fn(&SuiteEnv) -> Box<dyn SuiteExecution>,
}

impl SuiteDef {
    /// Required keys absent from `properties`
    pub fn missing_properties<V>(
        &self,
        properties: &std::collections::BTreeMap<String, V>,
    ) -> Vec<String> {
        self.requires
            .iter()
            .filter(|key| !properties.contains_key(**key))
            .map(|key| key.to_string())
            .collect()
    }
}

inventory::collect!(SuiteDef);

/// Register a suite so the launcher can find it by identifier
///
/// ```ignore
/// register_suite!("collections" => RecordingSuite::new(Collections::default()),
///     description = "HashMap and BTreeMap operations",
///     requires = ["collections.size"]);
/// ```
#[macro_export]
macro_rules! register_suite {
    ($id:literal => $ctor:expr
        $(, description = $desc:literal)?
        $(, requires = [$($req:literal),* $(,)?])?
        $(,)?) => {
        const _: () = {
            fn __isobench_factory(env: &$crate::SuiteEnv) -> ::std::boxed::Box<dyn $crate::SuiteExecution> {
                ::std::boxed::Box::new($crate::BenchmarkSuite::new($id, $ctor, env))
            }

            $crate::inventory::submit! {
                $crate::SuiteDef {
                    id: $id,
                    description: {
                        let description: ::std::option::Option<&'static str> = ::std::option::Option::None;
                        $(let description = ::std::option::Option::Some($desc);)?
                        description
                    },
                    requires: &[$($($req),*)?],
                    factory: __isobench_factory,
                }
            }
        };
    };
}

/// Registered suites, sorted by identifier
#[derive(Debug, Clone, Default)]
pub struct SuiteRegistry {
    defs: Vec<&'static SuiteDef>,
}

impl SuiteRegistry {
    /// Every suite registered in this binary
    pub fn discover() -> Self {
        Self::from_defs(inventory::iter::<SuiteDef>.into_iter().collect())
    }

    /// Registry over an explicit set of definitions. The first definition of
    /// a duplicated identifier wins.
    pub fn from_defs(mut defs: Vec<&'static SuiteDef>) -> Self {
        defs.sort_by_key(|d| d.id);
        defs.dedup_by(|later, first| {
            let duplicate = later.id == first.id;
            if duplicate {
                tracing::warn!(suite = later.id, "suite registered twice, keeping the first definition");
            }
            duplicate
        });
        Self { defs }
    }

    /// Look a suite up by identifier
    pub fn get(&self, id: &str) -> Option<&'static SuiteDef> {
        self.defs.iter().copied().find(|d| d.id == id)
    }

    /// Definitions sorted by identifier
    pub fn iter(&self) -> impl Iterator<Item = &'static SuiteDef> + '_ {
        self.defs.iter().copied()
    }

    /// Identifiers sorted alphabetically
    pub fn ids(&self) -> Vec<&'static str> {
        self.defs.iter().map(|d| d.id).collect()
    }

    /// Number of registered suites
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    /// Whether no suite is registered
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Instantiate suite `id`
    pub fn create(&self, id: &str, env: &SuiteEnv) -> Result<Box<dyn SuiteExecution>, BenchError> {
        let def = self
            .get(id)
            .ok_or_else(|| BenchError::UnknownSuite(id.to_string()))?;
        Ok((def.factory)(env))
    }
}

/// Anchor to prevent LTO from stripping inventory entries
#[used]
#[doc(hidden)]
pub static REGISTRY_ANCHOR: fn() = || {
    for _ in inventory::iter::<SuiteDef> {}
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    struct Empty;

    impl Suite for Empty {
        fn operations(&self) -> Vec<Operation<Self>> {
            Vec::new()
        }
    }

    fn empty_factory(env: &SuiteEnv) -> Box<dyn SuiteExecution> {
        Box::new(BenchmarkSuite::new("beta", Empty, env))
    }

    static ALPHA: SuiteDef = SuiteDef {
        id: "alpha",
        description: Some("first"),
        requires: &["alpha.host", "alpha.port"],
        factory: empty_factory,
    };
    static BETA: SuiteDef = SuiteDef {
        id: "beta",
        description: None,
        requires: &[],
        factory: empty_factory,
    };
    static BETA_AGAIN: SuiteDef = SuiteDef {
        id: "beta",
        description: Some("duplicate"),
        requires: &[],
        factory: empty_factory,
    };

    #[test]
    fn test_registry_sorted_and_deduplicated() {
        let registry = SuiteRegistry::from_defs(vec![&BETA, &ALPHA, &BETA_AGAIN]);

        assert_eq!(registry.ids(), vec!["alpha", "beta"]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("beta").and_then(|d| d.description), None);
    }

    #[test]
    fn test_unknown_suite() {
        let registry = SuiteRegistry::from_defs(vec![&ALPHA]);
        let err = registry
            .create("gamma", &SuiteEnv::default())
            .err()
            .unwrap();
        assert!(matches!(err, BenchError::UnknownSuite(id) if id == "gamma"));
    }

    #[test]
    fn test_create_and_run() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SuiteRegistry::from_defs(vec![&BETA]);
        let mut suite = registry.create("beta", &SuiteEnv::new(dir.path())).unwrap();

        assert_eq!(suite.id(), "beta");
        let summary = suite.run_all(ProgressWindow::FULL).unwrap();
        assert!(summary.completed_groups.is_empty());
        assert!(dir.path().join("beta").is_dir());
    }

    #[test]
    fn test_missing_properties() {
        let mut props = BTreeMap::new();
        props.insert("alpha.host".to_string(), "localhost".to_string());

        assert_eq!(ALPHA.missing_properties(&props), vec!["alpha.port"]);
        props.insert("alpha.port".to_string(), "80".to_string());
        assert!(ALPHA.missing_properties(&props).is_empty());
    }
}
