//! Admission mechanisms.
//!
//! A mechanism decides when an interaction is recorded relative to constraint
//! checking. All three share one contract, [`Mechanism::process`], and differ
//! only in what they see:
//!
//! | Mechanism | Sees | Records |
//! |---|---|---|
//! | [`Descriptive`] | nothing | every attempt |
//! | [`LocallyValidated`] | one resource's [`LocalView`] | admitted attempts |
//! | [`Directed`] | the whole state, full [`ConstraintSet`] | admitted attempts |
//!
//! The admission rules themselves live in [`policy`] so the resource nodes
//! and the coordinator apply exactly the same checks as the in-process
//! mechanisms.
//!
//! [`LocalView`]: crate::view::LocalView

mod descriptive;
mod directed;
mod local;

pub use descriptive::Descriptive;
pub use directed::Directed;
pub use local::LocallyValidated;
use tracegate_proto::{Interaction, MechanismTag};

use crate::{constraints::ConstraintSet, metrics, state::SystemState};

/// One recorded trace entry: the state the interaction was recorded against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    /// State at recording time
    pub state: SystemState,
    /// Recorded interaction
    pub interaction: Interaction,
}

/// Attempt and rejection counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MechanismStats {
    /// Interactions submitted
    pub attempts: u64,
    /// Interactions refused
    pub rejected: u64,
}

impl MechanismStats {
    /// Interactions admitted.
    pub fn admitted(&self) -> u64 {
        self.attempts - self.rejected
    }

    /// `EG = rejected / attempts`, 0 when nothing was attempted.
    pub fn enforcement_gap(&self) -> f64 {
        metrics::enforcement_gap(self.rejected, self.attempts)
    }

    pub(crate) fn record(&mut self, admitted: bool) {
        self.attempts += 1;
        if !admitted {
            self.rejected += 1;
        }
    }
}

/// Interaction-processing policy.
///
/// `process` never mutates its input state: it returns the successor state
/// (equal to the input on rejection) and the admission decision.
pub trait Mechanism {
    /// Which mechanism this is.
    fn tag(&self) -> MechanismTag;

    /// Decide on `interaction` against `state`.
    fn process(&mut self, state: &SystemState, interaction: &Interaction) -> (SystemState, bool);

    /// Recorded entries in recording order.
    fn trace(&self) -> &[Recorded];

    /// Attempt and rejection counters.
    fn stats(&self) -> MechanismStats;

    /// Forget the trace and counters.
    fn reset(&mut self);

    /// IVR of the recorded trace under `constraints`.
    fn invariant_violation_rate(&self, constraints: &ConstraintSet) -> f64 {
        metrics::invariant_violation_rate(
            constraints,
            self.trace().iter().map(|r| (&r.state, &r.interaction)),
        )
    }

    /// EG over all attempts so far.
    fn enforcement_gap(&self) -> f64 {
        self.stats().enforcement_gap()
    }
}

/// Admission rules shared by the in-process mechanisms and the services.
pub mod policy {
    use tracegate_proto::Interaction;

    use crate::{
        constraints::{ConstraintSet, authorized, exclusive},
        view::StateView,
    };

    /// Local composite `C_excl ∧ C_auth`.
    pub fn admit_local<V: StateView + ?Sized>(view: &V, interaction: &Interaction) -> bool {
        exclusive(view, interaction) && authorized(view, interaction)
    }

    /// Full `Conf` against a view that covers every monitored resource.
    pub fn admit_directed<V: StateView + ?Sized>(
        view: &V,
        constraints: &ConstraintSet,
        interaction: &Interaction,
    ) -> bool {
        constraints.conforms(view, interaction)
    }
}
