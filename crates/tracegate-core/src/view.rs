//! State views the constraint predicates evaluate against.
//!
//! A predicate only needs two questions answered: who holds a resource, and
//! whether an agent is authorized on it. [`StateView`] asks exactly those, so
//! the same predicate runs against the in-process [`SystemState`], a single
//! node's [`ResourceState`], a per-check [`LocalView`], or the coordinator's
//! [`AggregateView`].
//!
//! A resource absent from a view has no holders and grants no permissions.
//!
//! [`SystemState`]: crate::SystemState

use std::collections::{BTreeMap, BTreeSet};

use tracegate_proto::{AgentId, Interaction, PermissionRecord, ResourceId, ResourceState};

use crate::{constraints::ConstraintSet, state::apply_transition};

/// Read access to lock holders and permissions.
pub trait StateView {
    /// Current holders of `resource`. `None` if the view does not cover it.
    fn holders(&self, resource: &str) -> Option<&BTreeSet<AgentId>>;

    /// Whether `agent` holds a currently valid permission on `resource`.
    fn is_authorized(&self, agent: &str, resource: &str) -> bool;
}

impl StateView for ResourceState {
    fn holders(&self, resource: &str) -> Option<&BTreeSet<AgentId>> {
        (self.resource_id == resource).then_some(&self.locks)
    }

    fn is_authorized(&self, agent: &str, resource: &str) -> bool {
        self.resource_id == resource && self.permissions.get(agent).copied().unwrap_or(false)
    }
}

/// One agent's view of one resource.
///
/// Holds the resource's lock set and the agent's own permission record,
/// nothing else. Built fresh per admission check and never stored.
#[derive(Debug, Clone, Copy)]
pub struct LocalView<'a> {
    agent: &'a str,
    resource: &'a str,
    locks: &'a BTreeSet<AgentId>,
    permission: Option<&'a PermissionRecord>,
    time: u64,
}

impl<'a> LocalView<'a> {
    /// Build a view for `agent` on `resource`.
    pub fn new(
        agent: &'a str,
        resource: &'a str,
        locks: &'a BTreeSet<AgentId>,
        permission: Option<&'a PermissionRecord>,
        time: u64,
    ) -> Self {
        Self { agent, resource, locks, permission, time }
    }

    /// Resource this view covers.
    pub fn resource(&self) -> &str {
        self.resource
    }

    /// Holders of the viewed resource.
    pub fn locks(&self) -> &BTreeSet<AgentId> {
        self.locks
    }

    /// The viewing agent's permission record, if any.
    pub fn permission(&self) -> Option<&PermissionRecord> {
        self.permission
    }
}

impl StateView for LocalView<'_> {
    fn holders(&self, resource: &str) -> Option<&BTreeSet<AgentId>> {
        (self.resource == resource).then_some(self.locks)
    }

    fn is_authorized(&self, agent: &str, resource: &str) -> bool {
        self.resource == resource
            && self.agent == agent
            && self.permission.is_some_and(|p| p.is_valid_at(self.time))
    }
}

/// Union of per-node states collected by the coordinator in one round.
///
/// Built fresh for every decision from query results and dropped afterwards.
/// It is a best-effort point-in-time union, not a consistent cut: each node
/// was read at whatever instant it answered, and unreachable nodes are simply
/// missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateView {
    states: BTreeMap<ResourceId, ResourceState>,
}

impl AggregateView {
    /// Empty aggregate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) one node's state.
    pub fn insert(&mut self, state: ResourceState) {
        self.states.insert(state.resource_id.clone(), state);
    }

    /// State of `resource`, if it was collected.
    pub fn get(&self, resource: &str) -> Option<&ResourceState> {
        self.states.get(resource)
    }

    /// Whether `resource` was collected this round.
    pub fn contains(&self, resource: &str) -> bool {
        self.states.contains_key(resource)
    }

    /// Number of collected resources.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether nothing was collected.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Collected resource ids.
    pub fn resources(&self) -> impl Iterator<Item = &str> {
        self.states.keys().map(String::as_str)
    }

    /// Directed admission against this aggregate.
    ///
    /// An interaction whose target resource was not collected is rejected:
    /// without the target's own state neither exclusivity nor authorization
    /// can be established.
    pub fn admits(&self, constraints: &ConstraintSet, interaction: &Interaction) -> bool {
        self.contains(interaction.resource()) && constraints.conforms(self, interaction)
    }

    /// Apply a transition to the target resource, if it was collected.
    ///
    /// Returns whether the target was present.
    pub fn apply_in_place(&mut self, interaction: &Interaction) -> bool {
        match self.states.get_mut(interaction.resource()) {
            Some(state) => {
                apply_transition(&mut state.locks, interaction);
                true
            },
            None => false,
        }
    }

    /// Drop every lock while keeping permissions.
    pub fn clear_locks(&mut self) {
        for state in self.states.values_mut() {
            state.locks.clear();
        }
    }
}

impl FromIterator<ResourceState> for AggregateView {
    fn from_iter<T: IntoIterator<Item = ResourceState>>(iter: T) -> Self {
        let mut view = Self::new();
        for state in iter {
            view.insert(state);
        }
        view
    }
}

impl StateView for AggregateView {
    fn holders(&self, resource: &str) -> Option<&BTreeSet<AgentId>> {
        self.states.get(resource).map(|s| &s.locks)
    }

    fn is_authorized(&self, agent: &str, resource: &str) -> bool {
        self.states
            .get(resource)
            .and_then(|s| s.permissions.get(agent))
            .copied()
            .unwrap_or(false)
    }
}
