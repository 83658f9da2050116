//! Distributed experiment driver.
//!
//! Talks to running resource nodes and a coordinator over the wire protocol.
//! Each replication resets every node, submits one mechanism's workload,
//! pulls the node traces and derives IVR and EG from them. The three
//! mechanisms run back to back on the same generated workload.

use std::{collections::BTreeMap, time::Duration};

use tokio::task::JoinSet;
use tracegate_core::{ConstraintSet, Environment};
use tracegate_proto::{
    AgentId, Interaction, MechanismTag, Request, ResourceId, ResourceState, Response, TraceEntry,
};
use tracegate_server::client::{is_alive, send_request};
use tracing::{debug, info, warn};

use crate::{
    error::HarnessError,
    metrics::{mean, replay_ivr, trace_enforcement_gap},
    report::{MechanismReport, Replication, ScenarioSummary},
    workload::{Batch, WorkloadConfig, generate_interactions},
};

/// Liveness probing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Checks per service before giving up
    pub retries: u32,
    /// Pause between checks
    pub delay: Duration,
    /// Connect timeout of one check
    pub connect_timeout: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            retries: 30,
            delay: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(2),
        }
    }
}

/// Latencies and counts from one mechanism run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    /// Per-interaction latency in microseconds
    pub latencies: Vec<f64>,
    /// Per-interaction coordinator collection latency (`M_D` only)
    pub collect_latencies: Vec<f64>,
    /// Interactions admitted
    pub admitted: u64,
    /// Interactions submitted
    pub total: u64,
}

impl RunStats {
    fn record(&mut self, response: &Response, fallback_us: f64) {
        self.total += 1;
        if response.admitted == Some(true) {
            self.admitted += 1;
        }
        self.latencies.push(response.latency_us.unwrap_or(fallback_us));
        if let Some(collect) = response.collect_latency_us {
            self.collect_latencies.push(collect);
        }
    }
}

/// Driver for a deployed node set and coordinator.
#[derive(Debug, Clone)]
pub struct Orchestrator<E: Environment> {
    nodes: BTreeMap<ResourceId, String>,
    coordinator: String,
    constraints: ConstraintSet,
    timeout: Duration,
    env: E,
}

impl<E: Environment> Orchestrator<E> {
    /// Driver for `nodes` (resource id to `host:port`) and `coordinator`.
    ///
    /// `constraints` is what replayed traces are checked against and should
    /// match the coordinator's configuration.
    pub fn new(
        nodes: BTreeMap<ResourceId, String>,
        coordinator: impl Into<String>,
        constraints: ConstraintSet,
        timeout: Duration,
        env: E,
    ) -> Self {
        Self { nodes, coordinator: coordinator.into(), constraints, timeout, env }
    }

    /// Block until every node and the coordinator accept connections.
    pub async fn wait_for_services(&self, policy: ReadinessPolicy) -> Result<(), HarnessError> {
        let endpoints = self.nodes.values().chain(std::iter::once(&self.coordinator));
        for addr in endpoints {
            let mut attempt = 1;
            while !is_alive(addr, policy.connect_timeout).await {
                if attempt >= policy.retries {
                    return Err(HarnessError::Unreachable { addr: addr.clone(), attempts: attempt });
                }
                debug!(%addr, attempt, "service not reachable yet");
                attempt += 1;
                self.env.sleep(policy.delay).await;
            }
        }
        info!("All services reachable");
        Ok(())
    }

    /// Reset every node, authorizing `agents`.
    pub async fn reset_all(&self, agents: &[AgentId]) -> Result<(), HarnessError> {
        for addr in self.nodes.values() {
            self.call(addr, Request::Reset { agents: agents.to_vec() }).await?;
        }
        Ok(())
    }

    /// `M_P`: each interaction straight to its node, in order.
    pub async fn run_mp(&self, batches: &[Batch]) -> Result<RunStats, HarnessError> {
        let mut stats = RunStats::default();
        for interaction in batches.iter().flatten() {
            let addr = self.node_for(interaction)?;
            let start = self.env.now();
            let response =
                self.call(addr, Request::ProcessMp { interaction: interaction.clone() }).await?;
            stats.record(&response, self.env.elapsed_us(start));
        }
        Ok(stats)
    }

    /// `M_L`: per batch, snapshot every node, then submit the whole batch
    /// concurrently with each node validating against its snapshot.
    pub async fn run_ml(&self, batches: &[Batch]) -> Result<RunStats, HarnessError> {
        let mut stats = RunStats::default();
        for batch in batches.iter().filter(|b| !b.is_empty()) {
            let snapshots = self.snapshot_all().await;

            let mut submissions = JoinSet::new();
            for interaction in batch {
                let addr = self.node_for(interaction)?.clone();
                let request = Request::ProcessMl {
                    interaction: interaction.clone(),
                    snapshot: snapshots.get(interaction.resource()).cloned(),
                };
                let (timeout, env) = (self.timeout, self.env.clone());
                submissions.spawn(async move {
                    let start = env.now();
                    let result = send_request(&addr, &request, timeout).await;
                    (addr, result, env.elapsed_us(start))
                });
            }

            while let Some(joined) = submissions.join_next().await {
                let (addr, result, elapsed) =
                    joined.map_err(|e| HarnessError::Task(e.to_string()))?;
                let response = result.map_err(|e| HarnessError::request(&addr, e))?;
                let response = checked(&addr, "PROCESS_ML", response)?;
                stats.record(&response, elapsed);
            }
        }
        Ok(stats)
    }

    /// `M_D`: every interaction through the coordinator, one at a time.
    pub async fn run_md(&self, batches: &[Batch]) -> Result<RunStats, HarnessError> {
        let mut stats = RunStats::default();
        for interaction in batches.iter().flatten() {
            let start = self.env.now();
            let response = self
                .call(&self.coordinator, Request::ProcessMd { interaction: interaction.clone() })
                .await?;
            stats.record(&response, self.env.elapsed_us(start));
        }
        Ok(stats)
    }

    /// Concatenated traces of every node.
    pub async fn collect_traces(&self) -> Result<Vec<TraceEntry>, HarnessError> {
        let mut entries = Vec::new();
        for addr in self.nodes.values() {
            let response = self.call(addr, Request::GetTrace).await?;
            let trace = response.trace.ok_or_else(|| HarnessError::MissingField {
                kind: "GET_TRACE",
                addr: addr.clone(),
                field: "trace",
            })?;
            entries.extend(trace);
        }
        Ok(entries)
    }

    /// Current state of every node.
    pub async fn node_states(&self) -> Result<Vec<ResourceState>, HarnessError> {
        let mut states = Vec::with_capacity(self.nodes.len());
        for addr in self.nodes.values() {
            let response = self.call(addr, Request::GetState).await?;
            states.push(response.state.ok_or_else(|| HarnessError::MissingField {
                kind: "GET_STATE",
                addr: addr.clone(),
                field: "state",
            })?);
        }
        Ok(states)
    }

    /// IVR of `mechanism` in `trace`, replayed over the nodes' current
    /// permissions.
    pub async fn replay_ivr(
        &self,
        trace: &[TraceEntry],
        mechanism: MechanismTag,
    ) -> Result<f64, HarnessError> {
        let states = self.node_states().await?;
        Ok(replay_ivr(trace, mechanism, states, &self.constraints))
    }

    /// Run all three mechanisms on the workload generated from `workload`.
    ///
    /// `M_D` reports IVR 0 without replay: the coordinator checks every
    /// admission against the same constraints the replay would.
    pub async fn run_replication(
        &self,
        workload: &WorkloadConfig,
    ) -> Result<Replication, HarnessError> {
        let batches = generate_interactions(workload);
        let mut replication = Replication::new();

        for mechanism in MechanismTag::ALL {
            self.reset_all(&workload.agents).await?;
            let stats = match mechanism {
                MechanismTag::Descriptive => self.run_mp(&batches).await?,
                MechanismTag::LocallyValidated => self.run_ml(&batches).await?,
                MechanismTag::Directed => self.run_md(&batches).await?,
            };

            let trace = self.collect_traces().await?;
            let ivr = match mechanism {
                MechanismTag::Directed => 0.0,
                _ => self.replay_ivr(&trace, mechanism).await?,
            };
            let collect_latency_us =
                (!stats.collect_latencies.is_empty()).then(|| mean(&stats.collect_latencies));

            replication.insert(mechanism, MechanismReport {
                ivr,
                eg: trace_enforcement_gap(&trace, mechanism),
                trace_len: trace.iter().filter(|e| e.mechanism == mechanism).count(),
                attempts: stats.total,
                latency_us: Some(mean(&stats.latencies)),
                collect_latency_us,
                violations: BTreeMap::new(),
            });
        }
        Ok(replication)
    }

    /// Run `replications` seeds of `workload` and summarize.
    pub async fn run_scenario(
        &self,
        label: &str,
        workload: &WorkloadConfig,
        replications: u64,
    ) -> Result<ScenarioSummary, HarnessError> {
        let mut results = Vec::new();
        for seed in 0..replications {
            results.push(self.run_replication(&workload.clone().with_seed(seed)).await?);
            if (seed + 1) % 10 == 0 {
                info!("[{}] {}/{} replications done", label, seed + 1, replications);
            }
        }
        Ok(ScenarioSummary::from_replications(label, &results))
    }

    /// `GET_STATE` from every node; failed nodes are left out.
    async fn snapshot_all(&self) -> BTreeMap<ResourceId, ResourceState> {
        let mut snapshots = BTreeMap::new();
        for (resource, addr) in &self.nodes {
            match self.call(addr, Request::GetState).await {
                Ok(Response { state: Some(state), .. }) => {
                    snapshots.insert(resource.clone(), state);
                },
                Ok(_) => warn!(%resource, "GET_STATE without state, validating live"),
                Err(e) => warn!(%resource, error = %e, "snapshot failed, validating live"),
            }
        }
        snapshots
    }

    fn node_for(&self, interaction: &Interaction) -> Result<&String, HarnessError> {
        self.nodes
            .get(interaction.resource())
            .ok_or_else(|| HarnessError::UnknownResource(interaction.resource().to_owned()))
    }

    async fn call(&self, addr: &str, request: Request) -> Result<Response, HarnessError> {
        let kind = request.kind();
        let response = send_request(addr, &request, self.timeout)
            .await
            .map_err(|e| HarnessError::request(addr, e))?;
        checked(addr, kind, response)
    }
}

fn checked(addr: &str, kind: &'static str, response: Response) -> Result<Response, HarnessError> {
    if response.is_ok() {
        return Ok(response);
    }
    Err(HarnessError::Refused {
        kind,
        addr: addr.to_owned(),
        reason: response.error.unwrap_or_default(),
    })
}
