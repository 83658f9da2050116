//! Service configuration.

use std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};

use tracegate_core::ConstraintSet;
use tracegate_proto::{AgentId, ResourceId};

use crate::error::ServerError;

/// Agents authorized on a fresh node when none are configured.
pub const DEFAULT_AGENTS: &str = "a1,a2,a3,a4,a5";

/// Default per-call timeout for coordinator requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Resource node configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Address to bind to (e.g., "0.0.0.0:5001")
    pub bind_address: String,
    /// Resource owned by the node
    pub resource_id: ResourceId,
    /// Agents authorized at startup and after a reset without agents
    pub agents: Vec<AgentId>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5000".to_string(),
            resource_id: "r1".to_string(),
            agents: parse_agents(DEFAULT_AGENTS),
        }
    }
}

/// Coordinator configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Address to bind to (e.g., "0.0.0.0:6000")
    pub bind_address: String,
    /// Resource id to node `host:port`
    pub nodes: BTreeMap<ResourceId, String>,
    /// Timeout applied to every outbound call
    pub request_timeout: Duration,
    /// Constraints enforced on the aggregate
    pub constraints: ConstraintSet,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        let nodes = (1..=3).map(|i| (format!("r{i}"), format!("127.0.0.1:{}", 5000 + i))).collect();
        Self {
            bind_address: "0.0.0.0:6000".to_string(),
            nodes,
            request_timeout: DEFAULT_TIMEOUT,
            constraints: ConstraintSet::standard(),
        }
    }
}

/// Split a comma-separated agent list, dropping blanks.
pub fn parse_agents(list: &str) -> Vec<AgentId> {
    list.split(',').map(str::trim).filter(|a| !a.is_empty()).map(String::from).collect()
}

/// Split a comma-separated resource list into a set, dropping blanks.
pub fn parse_resources(list: &str) -> BTreeSet<ResourceId> {
    parse_agents(list).into_iter().collect()
}

/// Parse a node map such as `r1=host:5001,r2=host:5002`.
///
/// The colon form `r1:host:5001` is accepted as well.
pub fn parse_node_map(list: &str) -> Result<BTreeMap<ResourceId, String>, ServerError> {
    let mut nodes = BTreeMap::new();
    for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (resource, addr) = entry
            .split_once('=')
            .or_else(|| entry.split_once(':'))
            .ok_or_else(|| ServerError::Config(format!("bad node entry '{entry}'")))?;

        let (resource, addr) = (resource.trim(), addr.trim());
        if resource.is_empty() || !addr.contains(':') {
            return Err(ServerError::Config(format!("bad node entry '{entry}'")));
        }
        if nodes.insert(resource.to_string(), addr.to_string()).is_some() {
            return Err(ServerError::Config(format!("duplicate node for {resource}")));
        }
    }

    if nodes.is_empty() {
        return Err(ServerError::Config("node map is empty".to_string()));
    }
    Ok(nodes)
}
