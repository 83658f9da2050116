//! In-process comparison of the three mechanisms.
//!
//! Every mechanism starts from the same [`SystemState`] and processes the
//! same batches:
//!
//! - `M_P` processes each interaction in order
//! - `M_L` freezes a snapshot at the start of each batch; every interaction
//!   in the batch is validated against it while admissions accumulate in the
//!   live state, which is how simultaneous local checks race
//! - `M_D` serializes each batch in agent order and validates against the
//!   live state
//!
//! Every `process` call of `M_P` and `M_L` is timed through the
//! [`Environment`]; `M_D` times its own validation step.

use tracegate_core::{
    ConstraintSet, Descriptive, Directed, Environment, LocallyValidated, Mechanism, SystemState,
};
use tracegate_proto::MechanismTag;
use tracing::{debug, info};

use crate::{
    metrics::{mean, violations_by_constraint},
    report::{MechanismReport, Replication, ScenarioSummary},
    workload::{Batch, WorkloadConfig, generate_interactions},
};

/// In-process experiment runner.
#[derive(Debug, Clone)]
pub struct Simulation<E: Environment> {
    workload: WorkloadConfig,
    constraints: ConstraintSet,
    env: E,
}

impl<E: Environment> Simulation<E> {
    /// Runner for `workload`, measuring IVR against `constraints`.
    ///
    /// `M_D` enforces the same `constraints`.
    pub fn new(workload: WorkloadConfig, constraints: ConstraintSet, env: E) -> Self {
        Self { workload, constraints, env }
    }

    /// Workload template (the seed is overridden per replication).
    pub fn workload(&self) -> &WorkloadConfig {
        &self.workload
    }

    fn initial_state(&self) -> SystemState {
        SystemState::with_ids(&self.workload.agents, &self.workload.resources)
    }

    /// Run every mechanism once on the workload generated from `seed`.
    pub fn run_replication(&self, seed: u64) -> Replication {
        let batches = generate_interactions(&self.workload.clone().with_seed(seed));
        let initial = self.initial_state();

        let mut descriptive = Descriptive::new();
        let descriptive_latency = run_sequential(&mut descriptive, &initial, &batches, &self.env);

        let mut local = LocallyValidated::new();
        let local_latency = run_snapshotted(&mut local, &initial, &batches, &self.env);

        let mut directed = Directed::new(self.env.clone(), self.constraints.clone());
        run_serialized(&mut directed, &initial, &batches);
        let directed_latency = directed.average_latency_us();

        let mut replication = Replication::new();
        replication.insert(MechanismTag::Descriptive, self.report(&descriptive, descriptive_latency));
        replication.insert(MechanismTag::LocallyValidated, self.report(&local, local_latency));
        replication.insert(MechanismTag::Directed, self.report(&directed, directed_latency));

        debug!(seed, interactions = batches.iter().map(Vec::len).sum::<usize>(), "replication done");
        replication
    }

    /// Run `replications` seeds (`0..replications`) and summarize.
    pub fn run(&self, label: &str, replications: u64) -> ScenarioSummary {
        let results: Vec<Replication> = (0..replications)
            .map(|seed| {
                if (seed + 1) % 10 == 0 {
                    info!("[{}] {}/{} replications done", label, seed + 1, replications);
                }
                self.run_replication(seed)
            })
            .collect();
        ScenarioSummary::from_replications(label, &results)
    }

    fn report<M: Mechanism>(&self, mechanism: &M, latency_us: f64) -> MechanismReport {
        let stats = mechanism.stats();
        MechanismReport {
            ivr: mechanism.invariant_violation_rate(&self.constraints),
            eg: stats.enforcement_gap(),
            trace_len: mechanism.trace().len(),
            attempts: stats.attempts,
            latency_us: Some(latency_us),
            collect_latency_us: None,
            violations: violations_by_constraint(
                &self.constraints,
                mechanism.trace().iter().map(|r| (&r.state, &r.interaction)),
            ),
        }
    }
}

/// Mean `process` latency in microseconds.
fn run_sequential<M: Mechanism, E: Environment>(
    mechanism: &mut M,
    initial: &SystemState,
    batches: &[Batch],
    env: &E,
) -> f64 {
    let mut state = initial.clone();
    let mut latencies = Vec::new();
    for interaction in batches.iter().flatten() {
        let start = env.now();
        state = mechanism.process(&state, interaction).0;
        latencies.push(env.elapsed_us(start));
    }
    mean(&latencies)
}

/// Mean `process_with_snapshot` latency in microseconds.
fn run_snapshotted<E: Environment>(
    mechanism: &mut LocallyValidated,
    initial: &SystemState,
    batches: &[Batch],
    env: &E,
) -> f64 {
    let mut live = initial.clone();
    let mut latencies = Vec::new();
    for batch in batches {
        let snapshot = live.clone();
        for interaction in batch {
            let start = env.now();
            live = mechanism.process_with_snapshot(&snapshot, &live, interaction).0;
            latencies.push(env.elapsed_us(start));
        }
    }
    mean(&latencies)
}

fn run_serialized<M: Mechanism>(mechanism: &mut M, initial: &SystemState, batches: &[Batch]) {
    let mut state = initial.clone();
    for batch in batches {
        let mut ordered: Vec<_> = batch.iter().collect();
        ordered.sort_by(|a, b| a.agent().cmp(b.agent()));
        for interaction in ordered {
            state = mechanism.process(&state, interaction).0;
        }
    }
}
