//! Per-replication results and their aggregation across seeds.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracegate_proto::MechanismTag;

use crate::metrics::Summary;

/// Outcome of one mechanism in one replication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MechanismReport {
    /// Invariant violation rate
    pub ivr: f64,
    /// Enforcement gap
    pub eg: f64,
    /// Entries recorded by the mechanism
    pub trace_len: usize,
    /// Interactions submitted
    pub attempts: u64,
    /// Mean handling latency in microseconds, when measured
    pub latency_us: Option<f64>,
    /// Mean coordinator collection latency in microseconds (`M_D` only)
    pub collect_latency_us: Option<f64>,
    /// Recorded entries violating each constraint, by constraint name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub violations: BTreeMap<String, u64>,
}

/// One replication: a report per mechanism, all fed the same workload.
pub type Replication = BTreeMap<MechanismTag, MechanismReport>;

/// Statistics of one mechanism across replications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MechanismSummary {
    /// IVR across seeds
    pub ivr: Summary,
    /// EG across seeds
    pub eg: Summary,
    /// Trace length across seeds
    pub trace_len: Summary,
    /// Mean latency across seeds, if any replication measured it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_us: Option<Summary>,
    /// Mean collection latency across seeds, if measured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collect_latency_us: Option<Summary>,
    /// Violations per constraint across seeds (absent counts as 0)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub violations: BTreeMap<String, Summary>,
}

/// Summaries for every mechanism in a scenario.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScenarioSummary {
    /// Scenario label
    pub label: String,
    /// Number of replications
    pub replications: usize,
    /// Per-mechanism statistics
    pub mechanisms: BTreeMap<MechanismTag, MechanismSummary>,
}

impl ScenarioSummary {
    /// Aggregate `replications` under `label`.
    pub fn from_replications(label: impl Into<String>, replications: &[Replication]) -> Self {
        let mut mechanisms = BTreeMap::new();
        for tag in MechanismTag::ALL {
            let reports: Vec<&MechanismReport> =
                replications.iter().filter_map(|r| r.get(&tag)).collect();
            if reports.is_empty() {
                continue;
            }
            let field = |f: fn(&MechanismReport) -> f64| {
                Summary::of(&reports.iter().map(|r| f(r)).collect::<Vec<_>>())
            };
            let optional = |f: fn(&MechanismReport) -> Option<f64>| {
                let values: Vec<f64> = reports.iter().filter_map(|r| f(r)).collect();
                (!values.is_empty()).then(|| Summary::of(&values))
            };

            let names: BTreeSet<&String> =
                reports.iter().flat_map(|r| r.violations.keys()).collect();
            let violations = names
                .into_iter()
                .map(|name| {
                    let counts: Vec<f64> = reports
                        .iter()
                        .map(|r| r.violations.get(name).copied().unwrap_or(0) as f64)
                        .collect();
                    (name.clone(), Summary::of(&counts))
                })
                .collect();

            mechanisms.insert(tag, MechanismSummary {
                ivr: field(|r| r.ivr),
                eg: field(|r| r.eg),
                trace_len: field(|r| r.trace_len as f64),
                latency_us: optional(|r| r.latency_us),
                collect_latency_us: optional(|r| r.collect_latency_us),
                violations,
            });
        }

        Self { label: label.into(), replications: replications.len(), mechanisms }
    }

    /// Summary of `tag`, if it ran.
    pub fn get(&self, tag: MechanismTag) -> Option<&MechanismSummary> {
        self.mechanisms.get(&tag)
    }
}
