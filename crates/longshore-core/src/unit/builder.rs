//! Pure construction of unit specs from node configuration.
//!
//! Everything here is deterministic and side-effect free: the same config
//! always produces the same spec, and therefore the same fingerprint. The
//! node model relies on that to decide whether a live service needs to be
//! recreated.

use crate::config::{NodeConfig, PrimaryConfig};
use crate::types::ServiceKind;
use crate::unit::spec::UnitSpec;

const SERVICE_TYPE: &str = "simple";
const WANTED_BY: &str = "multi-user.target";
const RUNTIME_DIR: &str = "longshore";

const POLLER_RESTART_SEC: u32 = 60;
const POLLER_WATCHDOG_SEC: u64 = 86400;
const WORKER_RESTART_SEC: u32 = 60;
const WORKER_WATCHDOG_SEC: u64 = 259200;
const WORKER_ABORT_SEC: u64 = 600;

/// Derive the stable unit name for a service.
///
/// Worker names embed the node id and index, so they survive any update that
/// changes neither; broker and poller are per-node singletons.
pub fn unit_name(kind: ServiceKind, node_id: u32, index: usize) -> String {
    match kind {
        ServiceKind::Broker => "broker".to_string(),
        ServiceKind::Poller => "poller".to_string(),
        ServiceKind::Worker => format!("worker-{node_id}-{index}"),
    }
}

/// Build the broker unit spec.
///
/// The broker restarts unconditionally with no backoff: it is the rendezvous
/// point for every worker in the fleet and must come back immediately.
pub fn broker_spec(node: &NodeConfig, primary: &PrimaryConfig) -> UnitSpec {
    UnitSpec {
        description: format!("Package import broker (node {})", node.node_id),
        service_user: node.system_user.clone(),
        service_group: node.system_user.clone(),
        service_type: SERVICE_TYPE.to_string(),
        exec_start: format!(
            "{} broker tcp://*:{} --data-directory {}",
            node.importer_binary.display(),
            node.primary_port,
            primary.data_directory.display()
        ),
        restart: Some("always".to_string()),
        runtime_directory: Some(RUNTIME_DIR.to_string()),
        environment: base_environment(node),
        wanted_by: Some(WANTED_BY.to_string()),
        ..UnitSpec::default()
    }
}

/// Build the poller unit spec.
pub fn poller_spec(node: &NodeConfig, primary: &PrimaryConfig) -> UnitSpec {
    UnitSpec {
        description: format!("Package import poller (node {})", node.node_id),
        service_user: node.system_user.clone(),
        service_group: node.system_user.clone(),
        service_type: SERVICE_TYPE.to_string(),
        exec_start: format!(
            "{} poller --data-directory {} --source-directory {}",
            node.importer_binary.display(),
            primary.data_directory.display(),
            primary.source_directory.display()
        ),
        restart: Some("always".to_string()),
        restart_sec: Some(POLLER_RESTART_SEC),
        watchdog_sec: Some(POLLER_WATCHDOG_SEC),
        runtime_directory: Some(RUNTIME_DIR.to_string()),
        environment: base_environment(node),
        wanted_by: Some(WANTED_BY.to_string()),
        ..UnitSpec::default()
    }
}

/// Build a worker unit spec for a given index.
///
/// Workers get a private temp area and an interrupt-based watchdog: an import
/// can legitimately run for days, but a hung one must be recoverable without
/// killing the whole import mid-write.
pub fn worker_spec(node: &NodeConfig, index: usize) -> UnitSpec {
    let name = unit_name(ServiceKind::Worker, node.node_id, index);
    let mut exec_start = format!(
        "{} worker {} {}",
        node.importer_binary.display(),
        name,
        node.broker_endpoint()
    );
    if !node.publish_enabled {
        exec_start.push_str(" --no-publish");
    }

    UnitSpec {
        description: format!("Package import worker {index} (node {})", node.node_id),
        service_user: node.system_user.clone(),
        service_group: node.system_user.clone(),
        service_type: SERVICE_TYPE.to_string(),
        exec_start,
        restart: Some("always".to_string()),
        restart_sec: Some(WORKER_RESTART_SEC),
        timeout_abort_sec: Some(WORKER_ABORT_SEC),
        watchdog_sec: Some(WORKER_WATCHDOG_SEC),
        watchdog_signal: Some("SIGINT".to_string()),
        runtime_directory: Some(RUNTIME_DIR.to_string()),
        private_tmp: Some(true),
        environment: base_environment(node),
        wanted_by: Some(WANTED_BY.to_string()),
        ..UnitSpec::default()
    }
}

/// Environment shared by all service kinds.
///
/// The importer binary is opaque to us, but its output must be line-buffered
/// for journal capture, so the unbuffered flag is always set. Proxy and
/// credential assignments appear only when configured.
fn base_environment(node: &NodeConfig) -> Vec<String> {
    let mut env = vec!["PYTHONUNBUFFERED=1".to_string()];
    if let Some(ref proxy) = node.proxy.http
        && !proxy.is_empty()
    {
        env.push(format!("http_proxy={proxy}"));
    }
    if let Some(ref proxy) = node.proxy.https
        && !proxy.is_empty()
    {
        env.push(format!("https_proxy={proxy}"));
    }
    if let Some(ref credentials) = node.credentials_file {
        env.push(format!("IMPORTER_CREDENTIALS={}", credentials.display()));
    }
    env
}
