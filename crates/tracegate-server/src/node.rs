//! Resource node.
//!
//! [`ResourceNode`] owns one resource's lock set, permission table and audit
//! trace. It performs no I/O: the networked [`NodeService`] wraps it in a
//! mutex, measures handler latency and turns replies into wire responses.
//!
//! Every mutating operation happens while the service holds the node's
//! mutex, so validate-then-apply sequences on one resource never interleave.

use thiserror::Error;
use tokio::sync::Mutex;
use tracegate_core::{Environment, apply_transition, policy};
use tracegate_proto::{
    AgentId, Interaction, MechanismTag, Request, ResourceId, ResourceState, Response, TraceEntry,
};
use tracing::{debug, warn};

use crate::RequestHandler;

/// Requests a resource node refuses.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// Interaction targets a resource this node does not own
    #[error("interaction targets {got}, this node owns {expected}")]
    WrongResource {
        /// Resource owned by the node
        expected: ResourceId,
        /// Resource named in the interaction
        got: ResourceId,
    },

    /// Supplied snapshot describes a different resource
    #[error("snapshot describes {got}, this node owns {expected}")]
    SnapshotMismatch {
        /// Resource owned by the node
        expected: ResourceId,
        /// Resource named in the snapshot
        got: ResourceId,
    },

    /// Request kind is served elsewhere
    #[error("{0} is not handled by a resource node")]
    Unsupported(&'static str),
}

/// Outcome of one node operation, before latency is attached.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeReply {
    /// Operation succeeded with nothing to report
    Ok,
    /// Current resource state
    State(ResourceState),
    /// Admission decision of a `PROCESS_*` request
    Decision(bool),
    /// Full audit trace
    Trace(Vec<TraceEntry>),
}

impl NodeReply {
    /// Wire response. `latency_us` is only reported for decisions.
    pub fn into_response(self, latency_us: f64) -> Response {
        match self {
            Self::Ok => Response::ok(),
            Self::State(state) => Response::state(state),
            Self::Decision(admitted) => Response::decision(admitted, latency_us),
            Self::Trace(entries) => Response::trace(entries),
        }
    }
}

/// State machine for one resource.
#[derive(Debug, Clone)]
pub struct ResourceNode {
    state: ResourceState,
    trace: Vec<TraceEntry>,
}

impl ResourceNode {
    /// Node for `resource_id` with every agent in `agents` authorized.
    pub fn new<I, A>(resource_id: impl Into<ResourceId>, agents: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<AgentId>,
    {
        Self { state: ResourceState::new(resource_id, agents), trace: Vec::new() }
    }

    /// Owned resource.
    pub fn resource_id(&self) -> &str {
        &self.state.resource_id
    }

    /// Live resource state.
    pub fn state(&self) -> &ResourceState {
        &self.state
    }

    /// Audit trace in insertion order.
    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    /// `PROCESS_MP`: record against the live state, then apply. Always
    /// admitted.
    pub fn process_descriptive(&mut self, interaction: Interaction) -> Result<bool, NodeError> {
        self.check_target(&interaction)?;

        let snapshot = self.state.clone();
        apply_transition(&mut self.state.locks, &interaction);
        self.record(interaction, MechanismTag::Descriptive, true, Some(snapshot));
        Ok(true)
    }

    /// `PROCESS_ML`: local composite against `snapshot` (or the live state),
    /// record the decision with the state used, apply if admitted.
    pub fn process_local(
        &mut self,
        interaction: Interaction,
        snapshot: Option<ResourceState>,
    ) -> Result<bool, NodeError> {
        self.check_target(&interaction)?;

        let validation = match snapshot {
            Some(frozen) => {
                if frozen.resource_id != self.state.resource_id {
                    return Err(NodeError::SnapshotMismatch {
                        expected: self.state.resource_id.clone(),
                        got: frozen.resource_id,
                    });
                }
                frozen
            },
            None => self.state.clone(),
        };

        let admitted = policy::admit_local(&validation, &interaction);
        if admitted {
            apply_transition(&mut self.state.locks, &interaction);
        } else {
            debug!(resource = %self.state.resource_id, %interaction, "local check rejected");
        }
        self.record(interaction, MechanismTag::LocallyValidated, admitted, Some(validation));
        Ok(admitted)
    }

    /// `COMMIT`: realize a coordinator decision. No validation happens here;
    /// the node trusts the coordinator.
    pub fn commit(
        &mut self,
        interaction: Interaction,
        admitted: bool,
        snapshot: Option<ResourceState>,
    ) -> Result<(), NodeError> {
        self.check_target(&interaction)?;

        if admitted {
            apply_transition(&mut self.state.locks, &interaction);
        }
        self.record(interaction, MechanismTag::Directed, admitted, snapshot);
        Ok(())
    }

    /// `RESET`: fresh state with `agents` authorized, empty trace.
    pub fn reset(&mut self, agents: Vec<AgentId>) {
        self.state = ResourceState::new(self.state.resource_id.clone(), agents);
        self.trace.clear();
    }

    /// Dispatch one request. Every request kind maps to exactly one
    /// operation.
    pub fn handle(&mut self, request: Request) -> Result<NodeReply, NodeError> {
        match request {
            Request::GetState => Ok(NodeReply::State(self.state.clone())),
            Request::ProcessMp { interaction } => {
                self.process_descriptive(interaction).map(NodeReply::Decision)
            },
            Request::ProcessMl { interaction, snapshot } => {
                self.process_local(interaction, snapshot).map(NodeReply::Decision)
            },
            Request::Commit { interaction, admitted, state_snapshot } => {
                self.commit(interaction, admitted, state_snapshot).map(|()| NodeReply::Ok)
            },
            Request::GetTrace => Ok(NodeReply::Trace(self.trace.clone())),
            Request::Reset { agents } => {
                self.reset(agents);
                Ok(NodeReply::Ok)
            },
            Request::Ping => Ok(NodeReply::Ok),
            Request::ProcessMd { .. } => Err(NodeError::Unsupported("PROCESS_MD")),
        }
    }

    fn check_target(&self, interaction: &Interaction) -> Result<(), NodeError> {
        if interaction.resource() == self.state.resource_id {
            return Ok(());
        }
        Err(NodeError::WrongResource {
            expected: self.state.resource_id.clone(),
            got: interaction.resource().to_owned(),
        })
    }

    fn record(
        &mut self,
        interaction: Interaction,
        mechanism: MechanismTag,
        admitted: bool,
        state_snapshot: Option<ResourceState>,
    ) {
        self.trace.push(TraceEntry { interaction, mechanism, admitted, state_snapshot });
    }
}

/// Networked resource node.
pub struct NodeService<E: Environment> {
    node: Mutex<ResourceNode>,
    env: E,
}

impl<E: Environment> NodeService<E> {
    /// Serve `node`, measuring latency with `env`.
    pub fn new(node: ResourceNode, env: E) -> Self {
        Self { node: Mutex::new(node), env }
    }
}

impl<E: Environment> RequestHandler for NodeService<E> {
    async fn handle(&self, request: Request) -> Response {
        let kind = request.kind();
        let start = self.env.now();

        let result = {
            let mut node = self.node.lock().await;
            node.handle(request)
        };

        match result {
            Ok(reply) => reply.into_response(self.env.elapsed_us(start)),
            Err(e) => {
                warn!(kind, error = %e, "node refused request");
                Response::error(e.to_string())
            },
        }
    }
}
