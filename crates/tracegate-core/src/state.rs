//! In-process system state and the lock transition.

use std::collections::{BTreeMap, BTreeSet};

use tracegate_proto::{
    Action, AgentId, Interaction, PermissionRecord, ResourceId, ResourceState,
};

use crate::view::{LocalView, StateView};

static NO_HOLDERS: BTreeSet<AgentId> = BTreeSet::new();

/// Apply one interaction to a resource's lock set.
///
/// `acquire` inserts the agent, `release` removes it. No validation happens
/// here: callers decide whether the transition is admitted before applying
/// it. Releasing a lock the agent does not hold is a no-op.
pub fn apply_transition(locks: &mut BTreeSet<AgentId>, interaction: &Interaction) {
    match interaction.action() {
        Action::Acquire => {
            locks.insert(interaction.agent().to_owned());
        },
        Action::Release => {
            locks.remove(interaction.agent());
        },
    }
}

/// Whole-system state for the in-process simulation.
///
/// Tracks every resource's lock set, a `(agent, resource)` permission table
/// with full [`PermissionRecord`]s, and a logical clock.
///
/// # Invariants
///
/// - `a ∈ locks[r]` iff agent `a` currently holds `r`
/// - Under enforced exclusivity, `|locks[r]| <= 1`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SystemState {
    locks: BTreeMap<ResourceId, BTreeSet<AgentId>>,
    permissions: BTreeMap<AgentId, BTreeMap<ResourceId, PermissionRecord>>,
    time: u64,
}

impl SystemState {
    /// State with agents `a1..=an` and resources `r1..=rm`, no holders, every
    /// agent authorized on every resource.
    pub fn new(num_agents: usize, num_resources: usize) -> Self {
        let agents: Vec<AgentId> = (1..=num_agents).map(|i| format!("a{i}")).collect();
        let resources: Vec<ResourceId> = (1..=num_resources).map(|i| format!("r{i}")).collect();
        Self::with_ids(&agents, &resources)
    }

    /// State over explicit agent and resource ids, every agent authorized on
    /// every resource.
    pub fn with_ids(agents: &[AgentId], resources: &[ResourceId]) -> Self {
        let locks = resources.iter().map(|r| (r.clone(), BTreeSet::new())).collect();
        let permissions = agents
            .iter()
            .map(|a| {
                let row = resources.iter().map(|r| (r.clone(), PermissionRecord::granted()));
                (a.clone(), row.collect())
            })
            .collect();
        Self { locks, permissions, time: 0 }
    }

    /// Logical clock.
    pub fn time(&self) -> u64 {
        self.time
    }

    /// Set the logical clock.
    pub fn set_time(&mut self, time: u64) {
        self.time = time;
    }

    /// Known resource ids.
    pub fn resources(&self) -> impl Iterator<Item = &str> {
        self.locks.keys().map(String::as_str)
    }

    /// Known agent ids.
    pub fn agents(&self) -> impl Iterator<Item = &str> {
        self.permissions.keys().map(String::as_str)
    }

    /// Holders of `resource` (empty for unknown resources).
    pub fn locks(&self, resource: &str) -> &BTreeSet<AgentId> {
        self.locks.get(resource).unwrap_or(&NO_HOLDERS)
    }

    /// Permission of `agent` on `resource`.
    pub fn permission(&self, agent: &str, resource: &str) -> Option<&PermissionRecord> {
        self.permissions.get(agent).and_then(|row| row.get(resource))
    }

    /// Replace the permission of `agent` on `resource`.
    pub fn set_permission(
        &mut self,
        agent: impl Into<AgentId>,
        resource: impl Into<ResourceId>,
        record: PermissionRecord,
    ) {
        self.permissions.entry(agent.into()).or_default().insert(resource.into(), record);
    }

    /// Drop the permission of `agent` on `resource` entirely.
    pub fn remove_permission(&mut self, agent: &str, resource: &str) {
        if let Some(row) = self.permissions.get_mut(agent) {
            row.remove(resource);
        }
    }

    /// What `agent` can see when attempting `resource`.
    pub fn local_view<'a>(&'a self, agent: &'a str, resource: &'a str) -> LocalView<'a> {
        LocalView::new(
            agent,
            resource,
            self.locks(resource),
            self.permission(agent, resource),
            self.time,
        )
    }

    /// Apply an interaction in place.
    pub fn apply_in_place(&mut self, interaction: &Interaction) {
        let locks = self.locks.entry(interaction.resource().to_owned()).or_default();
        apply_transition(locks, interaction);
    }

    /// `δ(s, u)`: a new state with the interaction applied.
    #[must_use]
    pub fn apply(&self, interaction: &Interaction) -> Self {
        let mut next = self.clone();
        next.apply_in_place(interaction);
        next
    }

    /// Project one resource into the per-node form.
    ///
    /// Permission records collapse to their validity at the current time.
    pub fn resource_state(&self, resource: &str) -> ResourceState {
        let permissions = self
            .permissions
            .iter()
            .filter_map(|(agent, row)| {
                row.get(resource).map(|p| (agent.clone(), p.is_valid_at(self.time)))
            })
            .collect();

        ResourceState {
            resource_id: resource.to_owned(),
            locks: self.locks(resource).clone(),
            permissions,
        }
    }

    /// Whether no resource has more than one holder.
    pub fn is_exclusive(&self) -> bool {
        self.locks.values().all(|holders| holders.len() <= 1)
    }
}

impl StateView for SystemState {
    fn holders(&self, resource: &str) -> Option<&BTreeSet<AgentId>> {
        self.locks.get(resource)
    }

    fn is_authorized(&self, agent: &str, resource: &str) -> bool {
        self.permission(agent, resource).is_some_and(|p| p.is_valid_at(self.time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_authorizes_everyone() {
        let state = SystemState::new(2, 2);
        assert_eq!(state.resources().collect::<Vec<_>>(), ["r1", "r2"]);
        assert_eq!(state.agents().collect::<Vec<_>>(), ["a1", "a2"]);
        assert!(state.locks("r1").is_empty());
        assert_eq!(state.permission("a1", "r2"), Some(&PermissionRecord::granted()));
    }

    #[test]
    fn apply_leaves_original_untouched() {
        let state = SystemState::new(1, 1);
        let next = state.apply(&Interaction::acquire("a1", "r1", 0));
        assert!(state.locks("r1").is_empty());
        assert!(next.locks("r1").contains("a1"));
    }

    #[test]
    fn release_by_non_holder_is_noop() {
        let mut state = SystemState::new(2, 1);
        state.apply_in_place(&Interaction::acquire("a1", "r1", 0));
        state.apply_in_place(&Interaction::release("a2", "r1", 1));
        assert!(state.locks("r1").contains("a1"));
    }

    #[test]
    fn windowed_permission_follows_clock() {
        let mut state = SystemState::new(1, 1);
        state.set_permission("a1", "r1", PermissionRecord::windowed(2, 4));
        assert!(!state.is_authorized("a1", "r1"));
        state.set_time(3);
        assert!(state.is_authorized("a1", "r1"));
        assert_eq!(state.resource_state("r1").permissions.get("a1"), Some(&true));
    }

    #[test]
    fn local_view_sees_one_resource() {
        let mut state = SystemState::new(2, 2);
        state.apply_in_place(&Interaction::acquire("a1", "r1", 0));
        let view = state.local_view("a2", "r1");
        assert_eq!(view.locks().len(), 1);
        assert!(view.holders("r2").is_none());
    }

    #[test]
    fn resource_projection_round_trips_locks() {
        let mut state = SystemState::new(2, 2);
        state.apply_in_place(&Interaction::acquire("a2", "r2", 0));
        let projected = state.resource_state("r2");
        assert_eq!(projected.resource_id, "r2");
        assert!(projected.locks.contains("a2"));
        assert_eq!(projected.permissions.len(), 2);
    }
}
