//! Longshore Core Library
//!
//! Reconciliation engine for a distributed package-import fleet: models
//! importer nodes (primary and secondary), diffs desired against live
//! service topology, and converges the OS with the minimal set of
//! create/destroy/restart operations, including transactional relocation
//! of the persistent data and source directories.

pub mod backend;
pub mod commands;
pub mod config;
pub mod env;
pub mod fsops;
pub mod node;
pub mod source;
pub mod state;
pub mod status;
pub mod types;
pub mod unit;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{NodeConfig, PrimaryConfig, ProxyConfig, RoleConfig, SecondaryConfig};

    // Node model
    pub use crate::node::{
        ImporterNode, NodeState, ServiceInstance, Subsystems, Topology, UpdateParams,
    };

    // Collaborators
    pub use crate::backend::{ServiceBackend, SystemdBackend};
    pub use crate::fsops::{FsError, FsOps, LocalFs};
    pub use crate::source::{GitCloner, SourceCloner};

    // Driver
    pub use crate::commands::DriverContext;
    pub use crate::state::StateStore;
    pub use crate::status::NodeStatus;

    // Types
    pub use crate::types::{NodeRole, ServiceKind};
    pub use crate::unit::UnitSpec;
}
