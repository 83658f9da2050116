//! Standard invariant checks.
//!
//! These capture what must hold after any directed run, whatever the
//! workload.

use std::collections::BTreeSet;

use tracegate_core::{
    AggregateView, ConstraintSet, DEFAULT_K_MAX, constraints::distinct_holders, default_subset,
};
use tracegate_proto::{MechanismTag, ResourceId};

use super::{Invariant, InvariantResult, SystemSnapshot, Violation};

/// At most one holder per resource.
pub struct MutualExclusion;

impl Invariant for MutualExclusion {
    fn name(&self) -> &'static str {
        "mutual_exclusion"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for (resource, snapshot) in &state.resources {
            if snapshot.locks.len() > 1 {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("{resource} held by {:?}", snapshot.locks),
                });
            }
        }
        Ok(())
    }
}

/// At most `k_max` distinct agents hold locks across `subset`.
pub struct GlobalBound {
    subset: BTreeSet<ResourceId>,
    k_max: usize,
}

impl GlobalBound {
    /// Bound over `subset`.
    pub fn new(subset: BTreeSet<ResourceId>, k_max: usize) -> Self {
        Self { subset, k_max }
    }
}

impl Default for GlobalBound {
    fn default() -> Self {
        Self::new(default_subset(), DEFAULT_K_MAX)
    }
}

impl Invariant for GlobalBound {
    fn name(&self) -> &'static str {
        "global_bound"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let view: AggregateView = state.resources.values().cloned().collect();
        let holders = distinct_holders(&view, &self.subset);
        if holders > self.k_max {
            return Err(Violation {
                invariant: self.name(),
                message: format!(
                    "{holders} distinct holders across {:?}, bound is {}",
                    self.subset, self.k_max
                ),
            });
        }
        Ok(())
    }
}

/// Every admission by a validating mechanism conforms to the state it was
/// validated against.
///
/// Applies to `M_L` and `M_D` entries that carry a snapshot. `M_P` admits
/// without validating, so its entries are skipped.
pub struct TraceCompliance {
    constraints: ConstraintSet,
}

impl TraceCompliance {
    /// Check admissions against `constraints`.
    pub fn new(constraints: ConstraintSet) -> Self {
        Self { constraints }
    }
}

impl Invariant for TraceCompliance {
    fn name(&self) -> &'static str {
        "trace_compliance"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let validated = state
            .trace
            .iter()
            .filter(|e| e.admitted && e.mechanism != MechanismTag::Descriptive);

        for entry in validated {
            let Some(snapshot) = &entry.state_snapshot else { continue };
            if let Some(violated) = self.constraints.first_violation(snapshot, &entry.interaction) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "{} admitted {} against a state violating {}",
                        entry.mechanism,
                        entry.interaction,
                        violated.name()
                    ),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tracegate_proto::{Interaction, ResourceState, TraceEntry};

    use super::*;

    fn held(resource: &str, holders: &[&str]) -> ResourceState {
        let mut state = ResourceState::new(resource, ["a1", "a2", "a3"]);
        state.locks.extend(holders.iter().map(|h| (*h).to_string()));
        state
    }

    #[test]
    fn mutual_exclusion_flags_shared_lock() {
        let ok = SystemSnapshot::from_states([held("r1", &["a1"]), held("r2", &[])]);
        assert!(MutualExclusion.check(&ok).is_ok());

        let bad = SystemSnapshot::from_states([held("r1", &["a1", "a2"])]);
        let violation = MutualExclusion.check(&bad).unwrap_err();
        assert_eq!(violation.invariant, "mutual_exclusion");
        assert!(violation.message.contains("r1"));
    }

    #[test]
    fn global_bound_counts_distinct_agents_in_subset() {
        let subset: BTreeSet<ResourceId> =
            ["r1", "r2", "r3"].into_iter().map(String::from).collect();
        let check = GlobalBound::new(subset, 2);
        let snapshot = |holders: [(&str, &str); 3]| {
            SystemSnapshot::from_states(holders.map(|(r, a)| held(r, &[a])))
        };

        assert!(check.check(&snapshot([("r1", "a1"), ("r2", "a1"), ("r3", "a2")])).is_ok());
        assert!(check.check(&snapshot([("r1", "a1"), ("r2", "a2"), ("r3", "a3")])).is_err());

        // Holders outside the subset do not count.
        assert!(check.check(&snapshot([("r1", "a1"), ("r4", "a2"), ("r5", "a3")])).is_ok());
    }

    #[test]
    fn trace_compliance_skips_descriptive_entries() {
        let busy = held("r1", &["a1"]);
        let entry = |mechanism| TraceEntry {
            interaction: Interaction::acquire("a2", "r1", 1),
            mechanism,
            admitted: true,
            state_snapshot: Some(busy.clone()),
        };
        let check = TraceCompliance::new(ConstraintSet::standard());

        let descriptive =
            SystemSnapshot::empty().with_trace(vec![entry(MechanismTag::Descriptive)]);
        assert!(check.check(&descriptive).is_ok());

        let directed = SystemSnapshot::empty().with_trace(vec![entry(MechanismTag::Directed)]);
        let violation = check.check(&directed).unwrap_err();
        assert!(violation.message.contains("C_excl"));
    }

    #[test]
    fn trace_compliance_ignores_rejections() {
        let rejected = TraceEntry {
            interaction: Interaction::acquire("a2", "r1", 1),
            mechanism: MechanismTag::LocallyValidated,
            admitted: false,
            state_snapshot: Some(held("r1", &["a1"])),
        };
        let snapshot = SystemSnapshot::empty().with_trace(vec![rejected]);
        assert!(TraceCompliance::new(ConstraintSet::local()).check(&snapshot).is_ok());
    }
}
