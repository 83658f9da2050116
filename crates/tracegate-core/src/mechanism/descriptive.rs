use tracegate_proto::{Interaction, MechanismTag};

use super::{Mechanism, MechanismStats, Recorded};
use crate::state::SystemState;

/// `M_P`: record every attempt, validate nothing.
///
/// Compliance is only judged afterwards, by replaying the trace through the
/// constraint set. Its enforcement gap is 0 by construction.
#[derive(Debug, Clone, Default)]
pub struct Descriptive {
    trace: Vec<Recorded>,
    stats: MechanismStats,
}

impl Descriptive {
    /// Empty mechanism.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Mechanism for Descriptive {
    fn tag(&self) -> MechanismTag {
        MechanismTag::Descriptive
    }

    fn process(&mut self, state: &SystemState, interaction: &Interaction) -> (SystemState, bool) {
        self.stats.record(true);
        self.trace.push(Recorded { state: state.clone(), interaction: interaction.clone() });
        (state.apply(interaction), true)
    }

    fn trace(&self) -> &[Recorded] {
        &self.trace
    }

    fn stats(&self) -> MechanismStats {
        self.stats
    }

    fn reset(&mut self) {
        self.trace.clear();
        self.stats = MechanismStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::ConstraintSet;

    #[test]
    fn records_conflicting_acquires() {
        let mut mechanism = Descriptive::new();
        let state = SystemState::new(2, 1);
        let (state, first) = mechanism.process(&state, &Interaction::acquire("a1", "r1", 0));
        let (state, second) = mechanism.process(&state, &Interaction::acquire("a2", "r1", 1));

        assert!(first && second);
        assert_eq!(state.locks("r1").len(), 2);
        assert_eq!(mechanism.trace().len(), 2);
        assert!((mechanism.invariant_violation_rate(&ConstraintSet::standard()) - 0.5).abs() < 1e-9);
        assert!(mechanism.enforcement_gap().abs() < f64::EPSILON);
    }

    #[test]
    fn reset_clears_everything() {
        let mut mechanism = Descriptive::new();
        let _ = mechanism.process(&SystemState::new(1, 1), &Interaction::acquire("a1", "r1", 0));
        mechanism.reset();
        assert!(mechanism.trace().is_empty());
        assert_eq!(mechanism.stats(), MechanismStats::default());
    }
}
