//! Shared core types used across the node model and driver layers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Role of an importer node within the fleet.
///
/// The role is fixed at node construction. Changing it is a full teardown
/// plus fresh install, driven one level above the node model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeRole {
    /// Owns the broker and poller singletons in addition to workers.
    Primary,
    /// Runs workers only, pointed at a primary's broker endpoint.
    Secondary,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Primary => write!(f, "primary"),
            NodeRole::Secondary => write!(f, "secondary"),
        }
    }
}

/// Kind of a managed importer service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceKind {
    /// Hands out package-import assignments to workers.
    Broker,
    /// Watches the upstream source for new work and enqueues it.
    Poller,
    /// Performs the actual import work.
    Worker,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKind::Broker => write!(f, "broker"),
            ServiceKind::Poller => write!(f, "poller"),
            ServiceKind::Worker => write!(f, "worker"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serializes_kebab_case() {
        let json = serde_json::to_string(&NodeRole::Primary).expect("role should serialize");
        assert_eq!(json, "\"primary\"");
        let json = serde_json::to_string(&NodeRole::Secondary).expect("role should serialize");
        assert_eq!(json, "\"secondary\"");
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ServiceKind::Broker.to_string(), "broker");
        assert_eq!(ServiceKind::Poller.to_string(), "poller");
        assert_eq!(ServiceKind::Worker.to_string(), "worker");
    }
}
