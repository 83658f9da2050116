//! Trace metrics.
//!
//! - **IVR** (invariant violation rate): fraction of recorded entries whose
//!   interaction violates at least one constraint against the state it was
//!   recorded with
//! - **EG** (enforcement gap): fraction of attempts that were rejected
//!
//! Both are 0 over an empty input.

use tracegate_proto::Interaction;

use crate::{constraints::ConstraintSet, view::StateView};

/// IVR over `(state, interaction)` pairs.
pub fn invariant_violation_rate<'a, V, I>(constraints: &ConstraintSet, entries: I) -> f64
where
    V: StateView + ?Sized + 'a,
    I: IntoIterator<Item = (&'a V, &'a Interaction)>,
{
    let mut total = 0_u64;
    let mut violations = 0_u64;
    for (view, interaction) in entries {
        total += 1;
        if !constraints.conforms(view, interaction) {
            violations += 1;
        }
    }
    rate(violations, total)
}

/// EG from raw counters.
pub fn enforcement_gap(rejected: u64, attempts: u64) -> f64 {
    rate(rejected, attempts)
}

/// `numerator / denominator`, 0 when there is nothing to divide by.
pub fn rate(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    numerator as f64 / denominator as f64
}
