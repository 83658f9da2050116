//! Observable state snapshots for invariant checking.
//!
//! Invariants run against a snapshot rather than live nodes, so every check
//! in one pass sees the same state.

use std::collections::BTreeMap;

use tracegate_core::SystemState;
use tracegate_proto::{ResourceId, ResourceState, TraceEntry};

/// Resource states plus the audit trace at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemSnapshot {
    /// State of each resource
    pub resources: BTreeMap<ResourceId, ResourceState>,
    /// Trace entries from every node
    pub trace: Vec<TraceEntry>,
}

impl SystemSnapshot {
    /// No resources, no trace.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Snapshot of node states as reported by `GET_STATE`.
    pub fn from_states(states: impl IntoIterator<Item = ResourceState>) -> Self {
        let resources = states.into_iter().map(|s| (s.resource_id.clone(), s)).collect();
        Self { resources, trace: Vec::new() }
    }

    /// Snapshot of an in-process state.
    pub fn from_system_state(state: &SystemState) -> Self {
        Self::from_states(state.resources().map(|r| state.resource_state(r)))
    }

    /// Attach a trace.
    #[must_use]
    pub fn with_trace(mut self, trace: Vec<TraceEntry>) -> Self {
        self.trace = trace;
        self
    }
}

#[cfg(test)]
mod tests {
    use tracegate_proto::Interaction;

    use super::*;

    #[test]
    fn empty_snapshot() {
        let snapshot = SystemSnapshot::empty();
        assert!(snapshot.resources.is_empty());
        assert!(snapshot.trace.is_empty());
    }

    #[test]
    fn system_state_projects_every_resource() {
        let state = SystemState::new(2, 3).apply(&Interaction::acquire("a2", "r3", 0));
        let snapshot = SystemSnapshot::from_system_state(&state);

        assert_eq!(snapshot.resources.len(), 3);
        assert!(snapshot.resources["r3"].locks.contains("a2"));
        assert_eq!(snapshot.resources["r1"].permissions.get("a1"), Some(&true));
    }
}
