//! Value types exchanged between Tracegate components.
//!
//! These carry no behavior beyond construction and (de)serialization. State
//! transitions and constraint evaluation live in `tracegate-core`.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use serde::{Deserialize, Serialize};

/// Identifier of an agent (e.g. `"a1"`).
pub type AgentId = String;

/// Identifier of a resource (e.g. `"r1"`).
pub type ResourceId = String;

/// Attempted action on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Take the resource lock
    Acquire,
    /// Give the resource lock back
    Release,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Acquire => f.write_str("acquire"),
            Self::Release => f.write_str("release"),
        }
    }
}

/// One admission attempt: agent `agent` tries `action` on `resource` at
/// logical time `time`.
///
/// Immutable once built. On the wire the time field is named `timestamp`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interaction {
    agent: AgentId,
    resource: ResourceId,
    action: Action,
    #[serde(rename = "timestamp")]
    time: u64,
}

impl Interaction {
    /// Create an interaction.
    pub fn new(
        agent: impl Into<AgentId>,
        resource: impl Into<ResourceId>,
        action: Action,
        time: u64,
    ) -> Self {
        Self { agent: agent.into(), resource: resource.into(), action, time }
    }

    /// Shorthand for an `acquire` interaction.
    pub fn acquire(agent: impl Into<AgentId>, resource: impl Into<ResourceId>, time: u64) -> Self {
        Self::new(agent, resource, Action::Acquire, time)
    }

    /// Shorthand for a `release` interaction.
    pub fn release(agent: impl Into<AgentId>, resource: impl Into<ResourceId>, time: u64) -> Self {
        Self::new(agent, resource, Action::Release, time)
    }

    /// Requesting agent.
    pub fn agent(&self) -> &str {
        &self.agent
    }

    /// Targeted resource.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Attempted action.
    pub fn action(&self) -> Action {
        self.action
    }

    /// Logical attempt time.
    pub fn time(&self) -> u64 {
        self.time
    }

    /// Whether this is an `acquire`.
    pub fn is_acquire(&self) -> bool {
        self.action == Action::Acquire
    }
}

impl fmt::Display for Interaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}({}) t={}", self.agent, self.action, self.resource, self.time)
    }
}

/// Authorization of one agent on one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRecord {
    /// Whether the permission is granted at all
    pub valid: bool,
    /// Inclusive `(start, end)` window outside of which the permission lapses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_window: Option<(u64, u64)>,
}

impl PermissionRecord {
    /// A permission valid at every time.
    pub const fn granted() -> Self {
        Self { valid: true, time_window: None }
    }

    /// A permission that never validates.
    pub const fn revoked() -> Self {
        Self { valid: false, time_window: None }
    }

    /// A permission valid within the inclusive window `[start, end]`.
    pub const fn windowed(start: u64, end: u64) -> Self {
        Self { valid: true, time_window: Some((start, end)) }
    }

    /// True iff the record is valid and `time` falls inside its window (if
    /// any).
    pub fn is_valid_at(&self, time: u64) -> bool {
        if !self.valid {
            return false;
        }
        match self.time_window {
            None => true,
            Some((start, end)) => start <= time && time <= end,
        }
    }
}

impl Default for PermissionRecord {
    fn default() -> Self {
        Self::granted()
    }
}

/// State of a single resource, as owned by its resource node.
///
/// `locks` holds the current holders. With exclusivity enforced it has at
/// most one element; the descriptive mechanism may leave more.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceState {
    /// Resource this state belongs to
    pub resource_id: ResourceId,
    /// Agents currently holding the lock
    pub locks: BTreeSet<AgentId>,
    /// Per-agent permission flag for this resource
    pub permissions: BTreeMap<AgentId, bool>,
}

impl ResourceState {
    /// Fresh state: no holders, every listed agent authorized.
    pub fn new<I, A>(resource_id: impl Into<ResourceId>, agents: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<AgentId>,
    {
        Self {
            resource_id: resource_id.into(),
            locks: BTreeSet::new(),
            permissions: agents.into_iter().map(|a| (a.into(), true)).collect(),
        }
    }

    /// Whether nobody holds the resource.
    pub fn is_free(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Which mechanism produced a trace entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MechanismTag {
    /// Descriptive: records everything, validates nothing
    #[serde(rename = "M_P")]
    Descriptive,
    /// Locally validated: exclusivity and authorization on one resource
    #[serde(rename = "M_L")]
    LocallyValidated,
    /// Directed: full constraint set on the aggregate view
    #[serde(rename = "M_D")]
    Directed,
}

impl MechanismTag {
    /// All mechanisms, in comparison order.
    pub const ALL: [Self; 3] = [Self::Descriptive, Self::LocallyValidated, Self::Directed];

    /// Short wire label (`M_P`, `M_L`, `M_D`).
    pub const fn label(self) -> &'static str {
        match self {
            Self::Descriptive => "M_P",
            Self::LocallyValidated => "M_L",
            Self::Directed => "M_D",
        }
    }
}

impl fmt::Display for MechanismTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One audit record on a resource node.
///
/// Appended exactly once per processed interaction, never mutated, cleared
/// only by a node reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    /// The interaction decided on
    pub interaction: Interaction,
    /// Mechanism that made the decision
    pub mechanism: MechanismTag,
    /// Decision outcome
    pub admitted: bool,
    /// State the decision was evaluated against
    #[serde(default)]
    pub state_snapshot: Option<ResourceState>,
}
