//! Usage constraints.
//!
//! Three predicates over a [`StateView`] and an [`Interaction`]:
//!
//! - **Exclusivity** (`C_excl`, local): an `acquire` needs a free resource
//! - **Authorization** (`C_auth`, local): the agent needs a valid permission
//! - **Global bound** (`C_global`, global): at most `k_max` distinct agents may
//!   hold locks across a monitored resource subset
//!
//! All predicates are total and side-effect free. Compliance (`Conf`) is the
//! conjunction over a configured [`ConstraintSet`].
//!
//! `release` is never checked for ownership: an agent may release a lock it
//! does not hold and exclusivity still passes. Mechanism comparisons depend on
//! this, so it must not be tightened here.

use std::{collections::BTreeSet, fmt, str::FromStr};

use thiserror::Error;
use tracegate_proto::{Interaction, ResourceId};

use crate::view::StateView;

/// Default bound on distinct holders across the monitored subset.
pub const DEFAULT_K_MAX: usize = 2;

/// Default monitored subset: `{r1, r2}`.
pub fn default_subset() -> BTreeSet<ResourceId> {
    ["r1", "r2"].into_iter().map(String::from).collect()
}

/// `C_excl`: true unless this is an `acquire` on a held resource.
pub fn exclusive<V: StateView + ?Sized>(view: &V, interaction: &Interaction) -> bool {
    if !interaction.is_acquire() {
        return true;
    }
    view.holders(interaction.resource()).is_none_or(BTreeSet::is_empty)
}

/// `C_auth`: true iff the agent holds a currently valid permission on the
/// resource. A missing record fails closed.
pub fn authorized<V: StateView + ?Sized>(view: &V, interaction: &Interaction) -> bool {
    view.is_authorized(interaction.agent(), interaction.resource())
}

/// `C_global`: true unless this is an `acquire` inside `subset` while
/// `k_max` or more distinct agents already hold locks somewhere in `subset`.
pub fn global_bound<V: StateView + ?Sized>(
    view: &V,
    interaction: &Interaction,
    subset: &BTreeSet<ResourceId>,
    k_max: usize,
) -> bool {
    if !interaction.is_acquire() || !subset.contains(interaction.resource()) {
        return true;
    }
    distinct_holders(view, subset) < k_max
}

/// Number of distinct agents holding any lock in `subset`.
pub fn distinct_holders<V: StateView + ?Sized>(view: &V, subset: &BTreeSet<ResourceId>) -> usize {
    subset
        .iter()
        .filter_map(|resource| view.holders(resource))
        .flatten()
        .collect::<BTreeSet<_>>()
        .len()
}

/// Errors from parsing constraint configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstraintError {
    /// Name does not match any constraint
    #[error("unknown constraint: {0} (expected excl, auth or global)")]
    Unknown(String),

    /// Constraint list was empty
    #[error("constraint list is empty")]
    Empty,
}

/// One configured constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// `C_excl`
    Exclusive,
    /// `C_auth`
    Authorized,
    /// `C_global` over `subset` with bound `k_max`
    GlobalBound {
        /// Monitored resources
        subset: BTreeSet<ResourceId>,
        /// Maximum distinct holders across `subset`
        k_max: usize,
    },
}

impl Constraint {
    /// `C_global` with the default subset and bound.
    pub fn default_global() -> Self {
        Self::GlobalBound { subset: default_subset(), k_max: DEFAULT_K_MAX }
    }

    /// Short name used in configuration and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Exclusive => "C_excl",
            Self::Authorized => "C_auth",
            Self::GlobalBound { .. } => "C_global",
        }
    }

    /// Whether a single resource's state is enough to evaluate this.
    pub fn is_local(&self) -> bool {
        !matches!(self, Self::GlobalBound { .. })
    }

    /// Evaluate against `view`.
    pub fn holds<V: StateView + ?Sized>(&self, view: &V, interaction: &Interaction) -> bool {
        match self {
            Self::Exclusive => exclusive(view, interaction),
            Self::Authorized => authorized(view, interaction),
            Self::GlobalBound { subset, k_max } => global_bound(view, interaction, subset, *k_max),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GlobalBound { subset, k_max } => {
                let names: Vec<&str> = subset.iter().map(String::as_str).collect();
                write!(f, "C_global({{{}}}, k_max={k_max})", names.join(","))
            },
            other => f.write_str(other.name()),
        }
    }
}

impl FromStr for Constraint {
    type Err = ConstraintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "excl" | "c_excl" | "exclusive" => Ok(Self::Exclusive),
            "auth" | "c_auth" | "authorized" => Ok(Self::Authorized),
            "global" | "c_global" => Ok(Self::default_global()),
            other => Err(ConstraintError::Unknown(other.to_string())),
        }
    }
}

/// Ordered conjunction of constraints (`Conf`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintSet {
    constraints: Vec<Constraint>,
}

impl Default for ConstraintSet {
    fn default() -> Self {
        Self::standard()
    }
}

impl ConstraintSet {
    /// Set from an explicit list.
    pub fn new(constraints: Vec<Constraint>) -> Self {
        Self { constraints }
    }

    /// `C_excl ∧ C_auth ∧ C_global` with default subset and bound.
    pub fn standard() -> Self {
        Self::new(vec![Constraint::Exclusive, Constraint::Authorized, Constraint::default_global()])
    }

    /// `C_excl ∧ C_auth`: the strongest check one node can make alone.
    pub fn local() -> Self {
        Self::new(vec![Constraint::Exclusive, Constraint::Authorized])
    }

    /// Parse a comma-separated list such as `excl,auth,global`.
    pub fn parse_list(list: &str) -> Result<Self, ConstraintError> {
        let constraints = list
            .split(',')
            .filter(|name| !name.trim().is_empty())
            .map(str::parse::<Constraint>)
            .collect::<Result<Vec<_>, _>>()?;

        if constraints.is_empty() {
            return Err(ConstraintError::Empty);
        }
        Ok(Self::new(constraints))
    }

    /// Replace the subset and bound of every `C_global` in the set.
    #[must_use]
    pub fn with_global_bound(mut self, subset: &BTreeSet<ResourceId>, k_max: usize) -> Self {
        for constraint in &mut self.constraints {
            if let Constraint::GlobalBound { subset: s, k_max: k } = constraint {
                s.clone_from(subset);
                *k = k_max;
            }
        }
        self
    }

    /// Configured constraints in evaluation order.
    pub fn iter(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter()
    }

    /// Number of configured constraints.
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// Whether no constraint is configured (everything conforms).
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// `Conf(view, interaction)`: every configured constraint holds.
    pub fn conforms<V: StateView + ?Sized>(&self, view: &V, interaction: &Interaction) -> bool {
        self.constraints.iter().all(|c| c.holds(view, interaction))
    }

    /// First constraint that fails, for diagnostics.
    pub fn first_violation<V: StateView + ?Sized>(
        &self,
        view: &V,
        interaction: &Interaction,
    ) -> Option<&Constraint> {
        self.constraints.iter().find(|c| !c.holds(view, interaction))
    }
}

#[cfg(test)]
mod tests {
    use tracegate_proto::ResourceState;

    use super::*;
    use crate::{state::SystemState, view::AggregateView};

    #[test]
    fn exclusivity_blocks_second_acquire() {
        let mut state = SystemState::new(2, 2);
        let first = Interaction::acquire("a1", "r1", 0);
        assert!(exclusive(&state, &first));

        state.apply_in_place(&first);
        assert!(!exclusive(&state, &Interaction::acquire("a2", "r1", 1)));
    }

    #[test]
    fn release_by_non_holder_passes_exclusivity() {
        let mut state = SystemState::new(2, 1);
        state.apply_in_place(&Interaction::acquire("a1", "r1", 0));
        assert!(exclusive(&state, &Interaction::release("a2", "r1", 1)));
    }

    #[test]
    fn authorization_fails_closed() {
        let state = SystemState::new(2, 2);
        assert!(authorized(&state, &Interaction::acquire("a1", "r1", 0)));
        assert!(!authorized(&state, &Interaction::acquire("a9", "r1", 0)));
        assert!(!authorized(&state, &Interaction::acquire("a1", "r9", 0)));
    }

    #[test]
    fn global_bound_counts_distinct_agents() {
        let subset = default_subset();
        let mut state = SystemState::new(3, 3);
        state.apply_in_place(&Interaction::acquire("a1", "r1", 0));
        assert!(global_bound(&state, &Interaction::acquire("a2", "r2", 0), &subset, 2));

        state.apply_in_place(&Interaction::acquire("a2", "r2", 1));
        assert!(!global_bound(&state, &Interaction::acquire("a3", "r1", 2), &subset, 2));
        assert!(!global_bound(&state, &Interaction::acquire("a3", "r2", 2), &subset, 2));
    }

    #[test]
    fn global_bound_alone_rejects_on_free_subset_resource() {
        // a1 holds r1 and a2 holds r2. r4 is a free subset member so only
        // C_global can reject.
        let subset: BTreeSet<ResourceId> =
            ["r1", "r2", "r4"].into_iter().map(String::from).collect();
        let mut state = SystemState::new(3, 4);
        state.apply_in_place(&Interaction::acquire("a1", "r1", 0));
        state.apply_in_place(&Interaction::acquire("a2", "r2", 0));

        let attempt = Interaction::acquire("a3", "r4", 1);
        assert!(exclusive(&state, &attempt));
        assert!(authorized(&state, &attempt));
        assert!(!global_bound(&state, &attempt, &subset, 2));

        let set = ConstraintSet::standard().with_global_bound(&subset, 2);
        assert_eq!(set.first_violation(&state, &attempt).map(Constraint::name), Some("C_global"));
    }

    #[test]
    fn global_bound_ignores_resources_outside_subset() {
        let subset = default_subset();
        let mut state = SystemState::new(3, 3);
        state.apply_in_place(&Interaction::acquire("a1", "r1", 0));
        state.apply_in_place(&Interaction::acquire("a2", "r2", 0));
        assert!(global_bound(&state, &Interaction::acquire("a3", "r3", 1), &subset, 2));
        assert!(global_bound(&state, &Interaction::release("a3", "r1", 1), &subset, 2));
    }

    #[test]
    fn global_bound_is_blind_from_one_resource() {
        let mut r1 = ResourceState::new("r1", ["a1", "a2", "a3"]);
        r1.locks.insert("a1".to_string());
        let mut r2 = ResourceState::new("r2", ["a1", "a2", "a3"]);
        r2.locks.insert("a2".to_string());
        let attempt = Interaction::acquire("a3", "r2", 0);

        // The r1 node alone sees a single holder and lets the bound pass.
        let subset = default_subset();
        assert!(global_bound(&r1, &Interaction::acquire("a3", "r1", 0), &subset, 2));

        let aggregate: AggregateView = [r1, r2].into_iter().collect();
        assert!(!global_bound(&aggregate, &attempt, &subset, 2));
    }

    #[test]
    fn parse_constraint_list() {
        let set = ConstraintSet::parse_list("excl, auth").unwrap();
        assert_eq!(set, ConstraintSet::local());
        assert_eq!(ConstraintSet::parse_list("excl,auth,global").unwrap(), ConstraintSet::standard());
        assert_eq!(ConstraintSet::parse_list(" , "), Err(ConstraintError::Empty));
        assert_eq!(
            ConstraintSet::parse_list("excl,lease"),
            Err(ConstraintError::Unknown("lease".to_string()))
        );
    }

    #[test]
    fn local_set_has_only_local_constraints() {
        assert!(ConstraintSet::local().iter().all(Constraint::is_local));
        assert!(!ConstraintSet::standard().iter().all(Constraint::is_local));
    }

    #[test]
    fn display_global_bound() {
        assert_eq!(Constraint::default_global().to_string(), "C_global({r1,r2}, k_max=2)");
    }
}
