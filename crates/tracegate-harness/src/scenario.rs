//! The three evaluation scenarios.
//!
//! 1. **Concurrency sweep**: IVR against `lambda` in {0.3, 0.5, 0.7}; the
//!    workload exercises `C_excl ∧ C_auth` but IVR is measured against all
//!    three constraints
//! 2. **Global conflict**: acquisitions biased towards `{r1, r2}` with all
//!    three constraints
//! 3. **Latency scaling**: `n` in {3, 5, 10, 15} agents against `k`
//!    configured constraints (2, 3 or 5; 5 repeats the local pair)

use tracegate_core::{Constraint, ConstraintSet};

use crate::workload::WorkloadConfig;

/// One configuration inside a scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioRun {
    /// Label used in logs and reports
    pub label: String,
    /// Workload template
    pub workload: WorkloadConfig,
    /// Constraints enforced by `M_D` and used for IVR
    pub constraints: ConstraintSet,
}

/// A named family of runs.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    /// Short name, also the report file stem
    pub name: &'static str,
    /// Configurations to run
    pub runs: Vec<ScenarioRun>,
}

/// Agents in scenarios 1 and 2.
const AGENTS: usize = 5;
/// Resources in every scenario.
const RESOURCES: usize = 3;

/// Scenario 1.
pub fn concurrency_sweep(t_max: u64) -> Scenario {
    let runs = [0.3, 0.5, 0.7]
        .into_iter()
        .map(|lambda| ScenarioRun {
            label: format!("S1-lambda={lambda}"),
            workload: WorkloadConfig::new(AGENTS, RESOURCES).with_t_max(t_max).with_lambda(lambda),
            constraints: ConstraintSet::standard(),
        })
        .collect();
    Scenario { name: "scenario1", runs }
}

/// Scenario 2.
pub fn global_conflict(t_max: u64) -> Scenario {
    let run = ScenarioRun {
        label: "S2".to_string(),
        workload: WorkloadConfig::new(AGENTS, RESOURCES)
            .with_t_max(t_max)
            .with_global_conflict(true),
        constraints: ConstraintSet::standard(),
    };
    Scenario { name: "scenario2", runs: vec![run] }
}

/// Scenario 3 over the given constraint counts.
///
/// Unsupported counts are skipped.
pub fn latency_scaling(t_max: u64, constraint_counts: &[usize]) -> Scenario {
    let mut runs = Vec::new();
    for n in [3, 5, 10, 15] {
        for &k in constraint_counts {
            let Some(constraints) = constraint_family(k) else { continue };
            runs.push(ScenarioRun {
                label: format!("S3-n={n}-k={k}"),
                workload: WorkloadConfig::new(n, RESOURCES).with_t_max(t_max),
                constraints,
            });
        }
    }
    Scenario { name: "scenario3", runs }
}

/// Constraint set of size `k` used by the scaling scenario.
pub fn constraint_family(k: usize) -> Option<ConstraintSet> {
    let base = match k {
        2 => vec![Constraint::Exclusive, Constraint::Authorized],
        3 | 5 => vec![Constraint::Exclusive, Constraint::Authorized, Constraint::default_global()],
        _ => return None,
    };
    let mut constraints = base;
    if k == 5 {
        constraints.extend([Constraint::Exclusive, Constraint::Authorized]);
    }
    Some(ConstraintSet::new(constraints))
}

/// Every scenario with the default constraint counts.
pub fn all(t_max: u64) -> Vec<Scenario> {
    vec![concurrency_sweep(t_max), global_conflict(t_max), latency_scaling(t_max, &[2, 3, 5])]
}
