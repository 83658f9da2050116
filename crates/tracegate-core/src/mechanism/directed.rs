use std::time::Duration;

use tracegate_proto::{Interaction, MechanismTag};
use tracing::debug;

use super::{Mechanism, MechanismStats, Recorded, policy};
use crate::{
    constraints::{Constraint, ConstraintSet},
    env::{Environment, micros},
    state::SystemState,
};

/// `M_D`: admit iff the full constraint set holds on the global state.
///
/// Nothing is recorded before compliance is established, so every recorded
/// entry conforms to the state it was recorded against and the IVR of the
/// trace is 0 under the mechanism's own constraints.
///
/// Validation time is measured through `E` for each attempt.
#[derive(Debug, Clone)]
pub struct Directed<E: Environment> {
    env: E,
    constraints: ConstraintSet,
    trace: Vec<Recorded>,
    stats: MechanismStats,
    latencies: Vec<Duration>,
}

impl<E: Environment> Directed<E> {
    /// Mechanism enforcing `constraints`.
    pub fn new(env: E, constraints: ConstraintSet) -> Self {
        Self {
            env,
            constraints,
            trace: Vec::new(),
            stats: MechanismStats::default(),
            latencies: Vec::new(),
        }
    }

    /// Enforced constraints.
    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    /// Per-attempt validation latencies.
    pub fn latencies(&self) -> &[Duration] {
        &self.latencies
    }

    /// Mean validation latency in microseconds, 0 before any attempt.
    pub fn average_latency_us(&self) -> f64 {
        if self.latencies.is_empty() {
            return 0.0;
        }
        let total: Duration = self.latencies.iter().sum();
        micros(total) / self.latencies.len() as f64
    }
}

impl<E: Environment> Mechanism for Directed<E> {
    fn tag(&self) -> MechanismTag {
        MechanismTag::Directed
    }

    fn process(&mut self, state: &SystemState, interaction: &Interaction) -> (SystemState, bool) {
        let start = self.env.now();
        let admitted = policy::admit_directed(state, &self.constraints, interaction);
        self.latencies.push(self.env.now() - start);
        self.stats.record(admitted);

        if !admitted {
            debug!(
                %interaction,
                violated = self.constraints.first_violation(state, interaction).map(Constraint::name),
                "directed check rejected interaction"
            );
            return (state.clone(), false);
        }

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
        self.latencies.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    };

    use super::*;

    /// Clock that advances one microsecond per reading.
    #[derive(Clone, Default)]
    struct TickEnv(Arc<AtomicU64>);

    impl Environment for TickEnv {
        type Instant = Duration;

        fn now(&self) -> Duration {
            Duration::from_micros(self.0.fetch_add(1, Ordering::Relaxed))
        }

        async fn sleep(&self, _duration: Duration) {}
    }

    #[test]
    fn rejects_global_bound_breach() {
        let mut mechanism = Directed::new(TickEnv::default(), ConstraintSet::standard());
        let mut state = SystemState::new(3, 3);
        for (agent, resource) in [("a1", "r1"), ("a2", "r2")] {
            let (next, admitted) = mechanism.process(&state, &Interaction::acquire(agent, resource, 0));
            assert!(admitted);
            state = next;
        }

        let (after, admitted) = mechanism.process(&state, &Interaction::acquire("a3", "r1", 1));
        assert!(!admitted);
        assert_eq!(after, state);
        assert_eq!(mechanism.trace().len(), 2);
        assert!(mechanism.invariant_violation_rate(mechanism.constraints()).abs() < f64::EPSILON);
    }

    #[test]
    fn measures_latency_per_attempt() {
        let mut mechanism = Directed::new(TickEnv::default(), ConstraintSet::standard());
        let state = SystemState::new(1, 1);
        let _ = mechanism.process(&state, &Interaction::acquire("a1", "r1", 0));
        let _ = mechanism.process(&state, &Interaction::acquire("a1", "r9", 0));

        assert_eq!(mechanism.latencies(), [Duration::from_micros(1), Duration::from_micros(1)]);
        assert!((mechanism.average_latency_us() - 1.0).abs() < 1e-9);

        mechanism.reset();
        assert!(mechanism.average_latency_us().abs() < f64::EPSILON);
    }
}
