//! Live status collection for a managed importer node.

use serde::{Deserialize, Serialize};

use crate::node::ImporterNode;
use crate::types::{NodeRole, ServiceKind};

/// One service row: liveness is probed from the backend at collection time,
/// not read from the in-memory model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub unit_name: String,
    pub kind: ServiceKind,
    pub running: bool,
}

/// Summary counts for quick overview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSummary {
    pub total: usize,
    pub running: usize,
    pub stopped: usize,
}

/// Full status report for one node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatus {
    pub role: NodeRole,
    pub node_id: u32,
    pub worker_count: usize,
    pub services: Vec<ServiceStatus>,
    pub summary: StatusSummary,
    pub collected_at: String,
}

impl NodeStatus {
    /// Collect a report from an installed node.
    pub fn collect(node: &ImporterNode<'_>) -> anyhow::Result<NodeStatus> {
        if !node.is_installed() {
            anyhow::bail!("node is not initialized");
        }

        let services: Vec<ServiceStatus> = node
            .services()
            .iter()
            .map(|instance| ServiceStatus {
                unit_name: instance.unit_name.clone(),
                kind: instance.kind,
                running: node.backend().is_running(&instance.unit_name),
            })
            .collect();

        let running = services.iter().filter(|s| s.running).count();
        let summary = StatusSummary {
            total: services.len(),
            running,
            stopped: services.len() - running,
        };

        Ok(NodeStatus {
            role: node.config().node_role(),
            node_id: node.config().node_id,
            worker_count: node.config().worker_count,
            services,
            summary,
            collected_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}
