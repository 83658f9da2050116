//! Tracegate evaluation driver.
//!
//! # Usage
//!
//! ```bash
//! # All three scenarios in-process, 100 replications each
//! tracegate-eval simulate --replications 100 --output results
//!
//! # Against deployed services
//! tracegate-eval distributed --coordinator 127.0.0.1:6000 \
//!     --nodes r1=127.0.0.1:5001,r2=127.0.0.1:5002,r3=127.0.0.1:5003
//! ```

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::{Parser, Subcommand, ValueEnum};
use tracegate_core::ConstraintSet;
use tracegate_harness::{
    HarnessError, Orchestrator, ReadinessPolicy, Scenario, ScenarioSummary, Simulation, scenario,
};
use tracegate_proto::{MechanismTag, ResourceId};
use tracegate_server::{SystemEnv, config::parse_node_map};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Tracegate evaluation driver
#[derive(Parser, Debug)]
#[command(name = "tracegate-eval")]
#[command(about = "Compare admission mechanisms on seeded workloads")]
#[command(version)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Directory receiving one JSON report per scenario
    #[arg(short, long, default_value = "results", global = true)]
    output: PathBuf,

    /// Replications per configuration
    #[arg(short, long, default_value_t = 100, global = true)]
    replications: u64,

    /// Timesteps per workload
    #[arg(long, default_value_t = 50, global = true)]
    t_max: u64,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Run the mechanisms in-process
    Simulate {
        /// Scenarios to run
        #[arg(long, value_enum, default_value = "all")]
        scenario: Which,
    },

    /// Run against deployed resource nodes and a coordinator
    Distributed {
        /// Coordinator address
        #[arg(long, env = "COORDINATOR", default_value = "127.0.0.1:6000")]
        coordinator: String,

        /// Resource nodes as `r1=host:port,...`
        #[arg(
            long,
            env = "RESOURCE_NODES",
            default_value = "r1=127.0.0.1:5001,r2=127.0.0.1:5002,r3=127.0.0.1:5003"
        )]
        nodes: String,

        /// Timeout for each request in milliseconds
        #[arg(long, env = "TIMEOUT_MS", default_value = "5000")]
        timeout_ms: u64,

        /// Scenarios to run
        #[arg(long, value_enum, default_value = "all")]
        scenario: Which,

        /// Liveness checks per service before giving up
        #[arg(long, default_value_t = 30)]
        ready_retries: u32,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Which {
    /// Concurrency sweep
    Concurrency,
    /// Global conflict
    Global,
    /// Latency scaling
    Scaling,
    /// Every scenario
    All,
}

impl Which {
    fn scenarios(self, t_max: u64) -> Vec<Scenario> {
        match self {
            Self::Concurrency => vec![scenario::concurrency_sweep(t_max)],
            Self::Global => vec![scenario::global_conflict(t_max)],
            Self::Scaling => vec![scenario::latency_scaling(t_max, &[2, 3, 5])],
            Self::All => scenario::all(t_max),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    fs::create_dir_all(&args.output).map_err(|e| HarnessError::Output(e.to_string()))?;

    match args.mode {
        Mode::Simulate { scenario } => {
            for scenario in scenario.scenarios(args.t_max) {
                let summaries: Vec<ScenarioSummary> = scenario
                    .runs
                    .iter()
                    .map(|run| {
                        Simulation::new(
                            run.workload.clone(),
                            run.constraints.clone(),
                            SystemEnv::new(),
                        )
                        .run(&run.label, args.replications)
                    })
                    .collect();
                log_summaries(&summaries);
                write_report(&args.output, scenario.name, &summaries)?;
            }
        },
        Mode::Distributed { coordinator, nodes, timeout_ms, scenario, ready_retries } => {
            let nodes = parse_node_map(&nodes)?;
            let timeout = Duration::from_millis(timeout_ms);
            let readiness = ReadinessPolicy { retries: ready_retries, ..ReadinessPolicy::default() };

            // Replay always checks against what the coordinator enforces.
            let deployed = ConstraintSet::standard();
            orchestrator(&nodes, &coordinator, &deployed, timeout).wait_for_services(readiness).await?;

            for scenario in scenario.scenarios(args.t_max) {
                let mut summaries = Vec::with_capacity(scenario.runs.len());
                for run in &scenario.runs {
                    let driver = orchestrator(&nodes, &coordinator, &deployed, timeout);
                    summaries.push(
                        driver.run_scenario(&run.label, &run.workload, args.replications).await?,
                    );
                }
                log_summaries(&summaries);
                write_report(&args.output, scenario.name, &summaries)?;
            }
        },
    }

    Ok(())
}

fn orchestrator(
    nodes: &BTreeMap<ResourceId, String>,
    coordinator: &str,
    constraints: &ConstraintSet,
    timeout: Duration,
) -> Orchestrator<SystemEnv> {
    Orchestrator::new(nodes.clone(), coordinator, constraints.clone(), timeout, SystemEnv::new())
}

fn log_summaries(summaries: &[ScenarioSummary]) {
    for summary in summaries {
        for tag in MechanismTag::ALL {
            let Some(m) = summary.get(tag) else { continue };
            info!(
                "[{}] {}: IVR={:.4}±{:.4} EG={:.4}±{:.4} trace={:.1}{}",
                summary.label,
                tag.label(),
                m.ivr.mean,
                m.ivr.std,
                m.eg.mean,
                m.eg.std,
                m.trace_len.mean,
                m.latency_us.map(|l| format!(" latency={:.1}us", l.mean)).unwrap_or_default(),
            );
        }
    }
}

fn write_report(dir: &Path, name: &str, summaries: &[ScenarioSummary]) -> Result<(), HarnessError> {
    let path = dir.join(format!("{name}.json"));
    let json =
        serde_json::to_string_pretty(summaries).map_err(|e| HarnessError::Output(e.to_string()))?;
    fs::write(&path, json).map_err(|e| HarnessError::Output(format!("{}: {e}", path.display())))?;
    info!("Wrote {}", path.display());
    Ok(())
}
