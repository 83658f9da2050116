//! Measurement harness for Tracegate.
//!
//! Generates seeded workloads and runs the three admission mechanisms over
//! them, either in-process ([`Simulation`]) or against deployed resource
//! nodes and a coordinator ([`Orchestrator`]). Results are reported per
//! mechanism as invariant violation rate (IVR), enforcement gap (EG), trace
//! length and latency, summarized across replications.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks what must hold after a directed run:
//! mutual exclusion, the global bound, and compliance of every validated
//! trace entry. Use [`InvariantRegistry::for_constraints()`] to derive the
//! registry from the enforced constraint set.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod invariants;
pub mod metrics;
pub mod orchestrator;
pub mod report;
pub mod scenario;
pub mod simulation;
pub mod workload;

pub use error::HarnessError;
pub use invariants::{
    GlobalBound, Invariant, InvariantRegistry, InvariantResult, MutualExclusion, SystemSnapshot,
    TraceCompliance, Violation,
};
pub use metrics::{Summary, replay_ivr, trace_enforcement_gap, violations_by_constraint};
pub use orchestrator::{Orchestrator, ReadinessPolicy, RunStats};
pub use report::{MechanismReport, MechanismSummary, Replication, ScenarioSummary};
pub use scenario::{Scenario, ScenarioRun};
pub use simulation::Simulation;
pub use workload::{Batch, CONFLICT_BURST, CONFLICT_PERIOD, WorkloadConfig, generate_interactions};
