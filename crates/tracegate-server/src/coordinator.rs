//! Directed-mechanism coordinator.
//!
//! Per interaction the coordinator:
//!
//! 1. collects `GET_STATE` from every resource node concurrently
//! 2. evaluates the full constraint set against the [`AggregateView`]
//! 3. sends `COMMIT` with the decision to the owning node
//!
//! All three steps run under one process-wide decision lock. Decision `i+1`
//! therefore collects state that already contains the commit of decision
//! `i`, which is what makes the zero-violation guarantee hold under
//! concurrent callers.
//!
//! # Degraded collection
//!
//! A node that fails or times out during collection is dropped from the
//! aggregate for that round and logged. The decision is still made on the
//! partial view: this is best-effort, not linearizable. If the dropped node
//! owns the target resource the interaction is rejected, since neither
//! exclusivity nor authorization can be established without it.

use std::{collections::BTreeMap, time::Duration};

use thiserror::Error;
use tokio::{sync::Mutex, task::JoinSet};
use tracegate_core::{AggregateView, Constraint, ConstraintSet, Environment};
use tracegate_proto::{Interaction, Request, ResourceId, ResourceState, Response};
use tracing::{debug, error, warn};

use crate::{
    RequestHandler,
    client::{ClientError, send_request},
};

/// Why one node's state is missing from an aggregate.
#[derive(Error, Debug)]
pub enum CollectError {
    /// Request did not complete
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Node answered with `ok:false`
    #[error("node refused GET_STATE: {0}")]
    Refused(String),

    /// Node answered `ok` without a state
    #[error("GET_STATE response carried no state")]
    MissingState,

    /// Node reported a state for a different resource
    #[error("node for {expected} reported state of {got}")]
    WrongResource {
        /// Resource the node is mapped to
        expected: ResourceId,
        /// Resource in the returned state
        got: ResourceId,
    },
}

/// Errors that prevent a directed decision from completing.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    /// Interaction names a resource with no configured node
    #[error("no resource node configured for {0}")]
    UnknownResource(ResourceId),

    /// Owning node did not acknowledge the commit
    #[error("commit to {resource} failed: {reason}")]
    Commit {
        /// Target resource
        resource: ResourceId,
        /// Failure detail
        reason: String,
    },
}

/// Result of one directed decision.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectedOutcome {
    /// Decision
    pub admitted: bool,
    /// End-to-end handling time in microseconds
    pub latency_us: f64,
    /// Time spent collecting node states
    pub collect_latency_us: f64,
    /// Time spent evaluating the constraint set
    pub eval_latency_us: f64,
    /// Resources whose state could not be collected this round
    pub missing: Vec<ResourceId>,
}

impl DirectedOutcome {
    /// Whether the decision was made on a partial aggregate.
    pub fn is_degraded(&self) -> bool {
        !self.missing.is_empty()
    }

    /// Wire response (`PROCESS_MD` carries no `ok` field).
    pub fn into_response(self) -> Response {
        Response::directed(
            self.admitted,
            self.latency_us,
            self.collect_latency_us,
            self.eval_latency_us,
        )
    }
}

/// Directed-mechanism coordinator.
pub struct Coordinator<E: Environment> {
    nodes: BTreeMap<ResourceId, String>,
    constraints: ConstraintSet,
    timeout: Duration,
    decision: Mutex<()>,
    env: E,
}

impl<E: Environment> Coordinator<E> {
    /// Coordinator over `nodes` (resource id to `host:port`), enforcing
    /// `constraints`, with `timeout` on every outbound call.
    pub fn new(
        nodes: BTreeMap<ResourceId, String>,
        constraints: ConstraintSet,
        timeout: Duration,
        env: E,
    ) -> Self {
        Self { nodes, constraints, timeout, decision: Mutex::new(()), env }
    }

    /// Configured node map.
    pub fn nodes(&self) -> &BTreeMap<ResourceId, String> {
        &self.nodes
    }

    /// Enforced constraints.
    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    /// Query every node concurrently and build a fresh aggregate.
    ///
    /// Returns the aggregate and the resources that could not be collected.
    pub async fn collect(&self) -> (AggregateView, Vec<ResourceId>) {
        let mut queries = JoinSet::new();
        for (resource, addr) in &self.nodes {
            let resource = resource.clone();
            let addr = addr.clone();
            let timeout = self.timeout;
            queries.spawn(async move {
                let result = fetch_state(&resource, &addr, timeout).await;
                (resource, result)
            });
        }

        let mut view = AggregateView::new();
        while let Some(joined) = queries.join_next().await {
            match joined {
                Ok((_, Ok(state))) => view.insert(state),
                Ok((resource, Err(e))) => {
                    warn!(%resource, error = %e, "state collection failed, excluding node");
                },
                Err(e) => error!("state collection task failed: {}", e),
            }
        }

        // A panicked task loses its resource id, so derive gaps from the view.
        let missing = self.nodes.keys().filter(|r| !view.contains(r)).cloned().collect();
        (view, missing)
    }

    /// Run the full directed protocol for one interaction.
    pub async fn process_interaction(
        &self,
        interaction: &Interaction,
    ) -> Result<DirectedOutcome, CoordinatorError> {
        let start = self.env.now();
        let target = self
            .nodes
            .get(interaction.resource())
            .ok_or_else(|| CoordinatorError::UnknownResource(interaction.resource().to_owned()))?;

        let _decision = self.decision.lock().await;

        let collect_start = self.env.now();
        let (view, missing) = self.collect().await;
        let collect_latency_us = self.env.elapsed_us(collect_start);

        let eval_start = self.env.now();
        let admitted = view.admits(&self.constraints, interaction);
        let eval_latency_us = self.env.elapsed_us(eval_start);

        if !admitted {
            debug!(
                %interaction,
                violated = self.constraints.first_violation(&view, interaction).map(Constraint::name),
                degraded = !missing.is_empty(),
                "directed check rejected interaction"
            );
        }

        let commit = Request::Commit {
            interaction: interaction.clone(),
            admitted,
            state_snapshot: view.get(interaction.resource()).cloned(),
        };
        let acknowledged = send_request(target, &commit, self.timeout).await;
        match acknowledged {
            Ok(response) if response.is_ok() => {},
            Ok(response) => {
                return Err(CoordinatorError::Commit {
                    resource: interaction.resource().to_owned(),
                    reason: response.error.unwrap_or_else(|| "refused".to_string()),
                });
            },
            Err(e) => {
                return Err(CoordinatorError::Commit {
                    resource: interaction.resource().to_owned(),
                    reason: e.to_string(),
                });
            },
        }

        Ok(DirectedOutcome {
            admitted,
            latency_us: self.env.elapsed_us(start),
            collect_latency_us,
            eval_latency_us,
            missing,
        })
    }
}

impl<E: Environment> RequestHandler for Coordinator<E> {
    async fn handle(&self, request: Request) -> Response {
        match request {
            Request::ProcessMd { interaction } => {
                match self.process_interaction(&interaction).await {
                    Ok(outcome) => outcome.into_response(),
                    Err(e) => {
                        error!(%interaction, error = %e, "directed decision failed");
                        Response::error(e.to_string())
                    },
                }
            },
            Request::Ping => Response::ok(),
            other => Response::error(format!("{} is not handled by the coordinator", other.kind())),
        }
    }
}

async fn fetch_state(
    resource: &str,
    addr: &str,
    timeout: Duration,
) -> Result<ResourceState, CollectError> {
    let response = send_request(addr, &Request::GetState, timeout).await?;
    if !response.is_ok() {
        return Err(CollectError::Refused(response.error.unwrap_or_default()));
    }
    let state = response.state.ok_or(CollectError::MissingState)?;
    if state.resource_id != resource {
        return Err(CollectError::WrongResource {
            expected: resource.to_owned(),
            got: state.resource_id,
        });
    }
    Ok(state)
}
