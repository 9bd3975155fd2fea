//! Suite Planner
//!
//! Turns the suite identifiers given on the command line into the ordered
//! list of suites a batch dispatches.
//!
//! - Explicit identifiers run in the order given; unknown identifiers are
//!   rejected up front
//! - Without identifiers every registered suite runs, alphabetically, narrowed
//!   by the optional regex filter
//!
//! The plan also checks each suite's required properties before anything runs.

use isobench_core::{SuiteDef, SuiteRegistry};
use regex::Regex;
use std::collections::BTreeMap;
use thiserror::Error;

/// Planning failures, reported before any suite starts
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    /// Requested identifiers that no suite is registered under
    #[error("Unknown suite(s): {}", .0.join(", "))]
    UnknownSuites(Vec<String>),

    /// Suites with the required keys they lack
    #[error("Missing required properties: {}", format_missing(.0))]
    MissingProperties(Vec<(String, Vec<String>)>),
}

fn format_missing(missing: &[(String, Vec<String>)]) -> String {
    missing
        .iter()
        .map(|(suite, keys)| format!("{suite} needs {}", keys.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Ordered suites of one batch
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    /// Suites in execution order
    pub suites: Vec<&'static SuiteDef>,
}

impl ExecutionPlan {
    /// Identifiers in execution order
    pub fn ids(&self) -> Vec<String> {
        self.suites.iter().map(|d| d.id.to_string()).collect()
    }

    /// Fail with every suite whose required keys are absent from `properties`
    pub fn check_properties(&self, properties: &BTreeMap<String, String>) -> Result<(), PlanError> {
        let missing: Vec<(String, Vec<String>)> = self
            .suites
            .iter()
            .map(|def| (def.id.to_string(), def.missing_properties(properties)))
            .filter(|(_, keys)| !keys.is_empty())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(PlanError::MissingProperties(missing))
        }
    }
}

/// Build the execution plan
pub fn build_plan(
    registry: &SuiteRegistry,
    requested: &[String],
    filter: Option<&Regex>,
) -> Result<ExecutionPlan, PlanError> {
    if requested.is_empty() {
        let suites = registry
            .iter()
            .filter(|def| filter.is_none_or(|re| re.is_match(def.id)))
            .collect();
        return Ok(ExecutionPlan { suites });
    }

    let mut suites = Vec::with_capacity(requested.len());
    let mut unknown = Vec::new();
    for id in requested {
        match registry.get(id) {
            Some(def) => suites.push(def),
            None => unknown.push(id.clone()),
        }
    }

    if !unknown.is_empty() {
        return Err(PlanError::UnknownSuites(unknown));
    }
    Ok(ExecutionPlan { suites })
}

#[cfg(test)]
mod tests {
    use super::*;
    use isobench_core::{BenchError, ProgressWindow, SuiteEnv, SuiteExecution, SuiteSummary};

    struct Inert;

    impl SuiteExecution for Inert {
        fn id(&self) -> &str {
            "inert"
        }
        fn run_all(&mut self, _window: ProgressWindow) -> Result<SuiteSummary, BenchError> {
            Ok(SuiteSummary::default())
        }
    }

    fn inert(_env: &SuiteEnv) -> Box<dyn SuiteExecution> {
        Box::new(Inert)
    }

    static CODEC: SuiteDef = SuiteDef {
        id: "codec",
        description: None,
        requires: &[],
        factory: inert,
    };
    static COLLECTIONS: SuiteDef = SuiteDef {
        id: "collections",
        description: None,
        requires: &[],
        factory: inert,
    };
    static NETWORK: SuiteDef = SuiteDef {
        id: "network",
        description: None,
        requires: &["network.host", "network.port"],
        factory: inert,
    };

    fn registry() -> SuiteRegistry {
        SuiteRegistry::from_defs(vec![&NETWORK, &COLLECTIONS, &CODEC])
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_no_request_runs_everything_sorted() {
        let plan = build_plan(&registry(), &[], None).unwrap();
        assert_eq!(plan.ids(), ids(&["codec", "collections", "network"]));
    }

    #[test]
    fn test_requested_order_is_kept() {
        let plan = build_plan(&registry(), &ids(&["network", "codec"]), None).unwrap();
        assert_eq!(plan.ids(), ids(&["network", "codec"]));
    }

    #[test]
    fn test_filter_applies_to_full_listing() {
        let re = Regex::new("^co").unwrap();
        let plan = build_plan(&registry(), &[], Some(&re)).unwrap();
        assert_eq!(plan.ids(), ids(&["codec", "collections"]));
    }

    #[test]
    fn test_unknown_suites_are_rejected() {
        let err = build_plan(&registry(), &ids(&["codec", "disk", "gpu"]), None).unwrap_err();
        assert_eq!(err, PlanError::UnknownSuites(ids(&["disk", "gpu"])));
    }

    #[test]
    fn test_required_properties() {
        let plan = build_plan(&registry(), &ids(&["network", "codec"]), None).unwrap();

        let mut props = BTreeMap::new();
        props.insert("network.host".to_string(), "localhost".to_string());

        let err = plan.check_properties(&props).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing required properties: network needs network.port"
        );

        props.insert("network.port".to_string(), "9000".to_string());
        assert!(plan.check_properties(&props).is_ok());
    }
}
