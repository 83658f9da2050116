//! Trace metrics for distributed runs and summary statistics.
//!
//! In-process mechanisms keep the state each entry was recorded with, so
//! their IVR comes straight from [`tracegate_core::Mechanism`]. Node traces
//! do not: an `M_P` entry carries only the target's pre-state, and an `M_L`
//! entry the snapshot it was validated against. IVR for a distributed run is
//! therefore computed by replay: admitted entries are applied in timestamp
//! order to a reconstructed aggregate and each is checked against the full
//! constraint set just before it lands.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracegate_core::{AggregateView, ConstraintSet, StateView, metrics};
use tracegate_proto::{Interaction, MechanismTag, ResourceState, TraceEntry};

/// Mean and sample standard deviation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Summary {
    /// Arithmetic mean (0 for no samples)
    pub mean: f64,
    /// Sample standard deviation (0 for fewer than two samples)
    pub std: f64,
    /// Number of samples
    pub n: usize,
}

impl Summary {
    /// Summarize `values`.
    pub fn of(values: &[f64]) -> Self {
        let n = values.len();
        let mean = mean(values);
        if n < 2 {
            return Self { mean, std: 0.0, n };
        }
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        Self { mean, std: variance.sqrt(), n }
    }
}

/// Arithmetic mean, 0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Rejected entries over all entries of `mechanism`.
pub fn trace_enforcement_gap(trace: &[TraceEntry], mechanism: MechanismTag) -> f64 {
    let (attempts, rejected) = trace
        .iter()
        .filter(|e| e.mechanism == mechanism)
        .fold((0, 0), |(n, r), e| (n + 1, r + u64::from(!e.admitted)));
    metrics::enforcement_gap(rejected, attempts)
}

/// Count entries violating each constraint.
///
/// An entry violating several constraints counts once under each name.
pub fn violations_by_constraint<'a, V, I>(
    constraints: &ConstraintSet,
    entries: I,
) -> BTreeMap<String, u64>
where
    V: StateView + ?Sized + 'a,
    I: IntoIterator<Item = (&'a V, &'a Interaction)>,
{
    let mut counts = BTreeMap::new();
    for (view, interaction) in entries {
        let violated: BTreeSet<&str> =
            constraints.iter().filter(|c| !c.holds(view, interaction)).map(|c| c.name()).collect();
        for name in violated {
            *counts.entry(name.to_string()).or_insert(0) += 1;
        }
    }
    counts
}

/// IVR of `mechanism`'s admitted entries, by replay.
///
/// `initial` supplies the permissions of every node (locks are cleared
/// before replay). Entries whose resource is absent from `initial` count
/// towards the total but are never violations. Entries that share a
/// timestamp replay in trace order.
pub fn replay_ivr<I>(
    trace: &[TraceEntry],
    mechanism: MechanismTag,
    initial: I,
    constraints: &ConstraintSet,
) -> f64
where
    I: IntoIterator<Item = ResourceState>,
{
    let mut admitted: Vec<&TraceEntry> =
        trace.iter().filter(|e| e.mechanism == mechanism && e.admitted).collect();
    admitted.sort_by_key(|e| e.interaction.time());

    let mut view: AggregateView = initial.into_iter().collect();
    view.clear_locks();

    let mut violations = 0_u64;
    for entry in &admitted {
        let interaction = &entry.interaction;
        if view.contains(interaction.resource()) && !constraints.conforms(&view, interaction) {
            violations += 1;
        }
        view.apply_in_place(interaction);
    }
    metrics::rate(violations, admitted.len() as u64)
}

#[cfg(test)]
mod tests {
    use tracegate_proto::Interaction;

    use super::*;

    fn entry(interaction: Interaction, mechanism: MechanismTag, admitted: bool) -> TraceEntry {
        TraceEntry { interaction, mechanism, admitted, state_snapshot: None }
    }

    fn nodes() -> Vec<ResourceState> {
        ["r1", "r2", "r3"].into_iter().map(|r| ResourceState::new(r, ["a1", "a2", "a3"])).collect()
    }

    #[test]
    fn summary_uses_sample_deviation() {
        let summary = Summary::of(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((summary.mean - 5.0).abs() < 1e-12);
        assert!((summary.std - (32.0_f64 / 7.0).sqrt()).abs() < 1e-12);
        assert_eq!(summary.n, 8);
    }

    #[test]
    fn degenerate_summaries_are_zero() {
        assert_eq!(Summary::of(&[]), Summary { mean: 0.0, std: 0.0, n: 0 });
        assert_eq!(Summary::of(&[3.5]), Summary { mean: 3.5, std: 0.0, n: 1 });
    }

    #[test]
    fn gap_counts_only_the_named_mechanism() {
        let trace = vec![
            entry(Interaction::acquire("a1", "r1", 0), MechanismTag::LocallyValidated, true),
            entry(Interaction::acquire("a2", "r1", 0), MechanismTag::LocallyValidated, false),
            entry(Interaction::acquire("a3", "r1", 0), MechanismTag::Descriptive, true),
        ];
        assert!((trace_enforcement_gap(&trace, MechanismTag::LocallyValidated) - 0.5).abs() < 1e-12);
        assert_eq!(trace_enforcement_gap(&trace, MechanismTag::Descriptive), 0.0);
        assert_eq!(trace_enforcement_gap(&trace, MechanismTag::Directed), 0.0);
    }

    #[test]
    fn replay_detects_double_acquire() {
        let trace = vec![
            entry(Interaction::acquire("a2", "r1", 1), MechanismTag::Descriptive, true),
            entry(Interaction::acquire("a1", "r1", 0), MechanismTag::Descriptive, true),
        ];
        let ivr = replay_ivr(&trace, MechanismTag::Descriptive, nodes(), &ConstraintSet::local());
        assert!((ivr - 0.5).abs() < 1e-12);
    }

    #[test]
    fn replay_ignores_rejected_entries() {
        let trace = vec![
            entry(Interaction::acquire("a1", "r1", 0), MechanismTag::Directed, true),
            entry(Interaction::acquire("a2", "r1", 1), MechanismTag::Directed, false),
            entry(Interaction::release("a1", "r1", 2), MechanismTag::Directed, true),
            entry(Interaction::acquire("a2", "r1", 3), MechanismTag::Directed, true),
        ];
        let ivr = replay_ivr(&trace, MechanismTag::Directed, nodes(), &ConstraintSet::standard());
        assert_eq!(ivr, 0.0);
    }

    #[test]
    fn replay_applies_the_global_bound_across_nodes() {
        let trace = vec![
            entry(Interaction::acquire("a1", "r1", 0), MechanismTag::LocallyValidated, true),
            entry(Interaction::acquire("a2", "r2", 0), MechanismTag::LocallyValidated, true),
        ];
        let subset = ["r1", "r2"].into_iter().map(String::from).collect();
        let tight = ConstraintSet::standard().with_global_bound(&subset, 1);
        let ivr = replay_ivr(&trace, MechanismTag::LocallyValidated, nodes(), &tight);
        assert!((ivr - 0.5).abs() < 1e-12);
    }

    #[test]
    fn violations_are_counted_per_constraint() {
        let state = tracegate_core::SystemState::new(3, 3)
            .apply(&Interaction::acquire("a1", "r1", 0))
            .apply(&Interaction::acquire("a2", "r2", 0));
        let clash = Interaction::acquire("a3", "r1", 1);
        let stranger = Interaction::acquire("a9", "r3", 1);
        let fine = Interaction::acquire("a3", "r3", 1);

        let constraints = ConstraintSet::standard();
        let counts = violations_by_constraint(
            &constraints,
            [(&state, &clash), (&state, &stranger), (&state, &fine)],
        );
        assert_eq!(counts.get("C_excl"), Some(&1));
        assert_eq!(counts.get("C_global"), Some(&1));
        assert_eq!(counts.get("C_auth"), Some(&1));
    }

    #[test]
    fn replay_of_empty_trace_is_zero() {
        assert_eq!(replay_ivr(&[], MechanismTag::Descriptive, nodes(), &ConstraintSet::standard()), 0.0);
    }
}
