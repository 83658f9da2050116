//! Tracegate server binary.
//!
//! # Usage
//!
//! ```bash
//! # One resource node per resource
//! tracegate-server node --resource-id r1 --bind 0.0.0.0:5001 --agents a1,a2,a3
//!
//! # Coordinator for the directed mechanism
//! tracegate-server coordinator --bind 0.0.0.0:6000 \
//!     --nodes r1=127.0.0.1:5001,r2=127.0.0.1:5002,r3=127.0.0.1:5003
//! ```

use std::time::Duration;

use clap::{Parser, Subcommand};
use tracegate_core::{ConstraintSet, DEFAULT_K_MAX};
use tracegate_server::{
    CoordinatorConfig, NodeConfig, Server,
    config::{DEFAULT_AGENTS, parse_agents, parse_node_map, parse_resources},
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Tracegate admission services
#[derive(Parser, Debug)]
#[command(name = "tracegate-server")]
#[command(about = "Tracegate resource node and coordinator")]
#[command(version)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand, Debug)]
enum Role {
    /// Serve one resource
    Node {
        /// Resource owned by this node
        #[arg(long, env = "RESOURCE_ID", default_value = "r1")]
        resource_id: String,

        /// Address to bind to
        #[arg(short, long, env = "BIND_ADDRESS", default_value = "0.0.0.0:5000")]
        bind: String,

        /// Comma-separated agents authorized at startup
        #[arg(long, env = "AGENTS", default_value = DEFAULT_AGENTS)]
        agents: String,
    },

    /// Serve directed-mechanism decisions
    Coordinator {
        /// Address to bind to
        #[arg(short, long, env = "BIND_ADDRESS", default_value = "0.0.0.0:6000")]
        bind: String,

        /// Resource nodes as `r1=host:port,...`
        #[arg(
            long,
            env = "RESOURCE_NODES",
            default_value = "r1=127.0.0.1:5001,r2=127.0.0.1:5002,r3=127.0.0.1:5003"
        )]
        nodes: String,

        /// Timeout for each node request in milliseconds
        #[arg(long, env = "TIMEOUT_MS", default_value = "5000")]
        timeout_ms: u64,

        /// Enforced constraints (excl, auth, global)
        #[arg(long, default_value = "excl,auth,global")]
        constraints: String,

        /// Resources monitored by the global bound
        #[arg(long, default_value = "r1,r2")]
        subset: String,

        /// Maximum distinct holders across the monitored subset
        #[arg(long, default_value_t = DEFAULT_K_MAX)]
        k_max: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    match args.role {
        Role::Node { resource_id, bind, agents } => {
            let config =
                NodeConfig { bind_address: bind, resource_id, agents: parse_agents(&agents) };
            tracing::info!(
                resource = %config.resource_id,
                agents = config.agents.len(),
                "Tracegate resource node starting"
            );

            let server = Server::node(config).await?;
            tracing::info!("Node listening on {}", server.local_addr()?);
            server.run().await?;
        },
        Role::Coordinator { bind, nodes, timeout_ms, constraints, subset, k_max } => {
            let subset = parse_resources(&subset);
            let config = CoordinatorConfig {
                bind_address: bind,
                nodes: parse_node_map(&nodes)?,
                request_timeout: Duration::from_millis(timeout_ms),
                constraints: ConstraintSet::parse_list(&constraints)?
                    .with_global_bound(&subset, k_max),
            };
            for constraint in config.constraints.iter() {
                tracing::info!("Enforcing {}", constraint);
            }
            tracing::info!(nodes = config.nodes.len(), "Tracegate coordinator starting");

            let server = Server::coordinator(config).await?;
            tracing::info!("Coordinator listening on {}", server.local_addr()?);
            server.run().await?;
        },
    }

    Ok(())
}
