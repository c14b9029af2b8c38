//! In-memory model of one importer node and its managed services.
//!
//! The node model owns the reconciliation algorithm: given a desired
//! configuration it computes the minimal set of create/destroy/restart
//! operations needed to converge the live topology, preserving services
//! whose configuration is unchanged. All OS effects go through injected
//! collaborators, so the algorithm itself is pure ordering logic.
//!
//! There is no rollback anywhere. A failed step leaves everything already
//! applied in place and surfaces the error; re-driving the same call
//! converges, because every step is idempotent and refresh decisions are
//! fingerprint-driven.

pub mod relocate;

pub use relocate::DB_FILE;

use anyhow::Context;
use tracing::info;

use crate::backend::ServiceBackend;
use crate::config::{NodeConfig, RoleConfig};
use crate::fsops::FsOps;
use crate::source::{self, SourceCloner};
use crate::types::{NodeRole, ServiceKind};
use crate::unit::{self, UnitSpec};

use relocate::RelocationOutcome;

/// One managed OS service, as the model believes the backend sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInstance {
    pub kind: ServiceKind,
    /// Stable derived name; recreation reuses it unless node id or index
    /// change.
    pub unit_name: String,
    /// Last-known liveness.
    pub running: bool,
    /// Fingerprint of the spec baked into the unit at creation time.
    pub fingerprint: String,
}

impl ServiceInstance {
    fn new(kind: ServiceKind, unit_name: String, spec: &UnitSpec) -> Self {
        Self {
            kind,
            unit_name,
            running: false,
            fingerprint: spec.fingerprint(),
        }
    }
}

/// Live service topology of an installed node.
///
/// A secondary has no broker or poller fields at all, so it can never hold
/// one. The primary's singletons are optional to represent the transient
/// gap between destroy and recreate honestly; `update` recreates a missing
/// singleton on the next pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topology {
    Primary {
        broker: Option<ServiceInstance>,
        poller: Option<ServiceInstance>,
        workers: Vec<ServiceInstance>,
    },
    Secondary {
        workers: Vec<ServiceInstance>,
    },
}

/// Node lifecycle state. Every lifecycle operation on an uninitialized node
/// fails fast without touching the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeState {
    Uninitialized,
    Installed(Topology),
}

/// Per-class opt-outs for start/stop/destroy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subsystems {
    pub broker: bool,
    pub poller: bool,
    pub workers: bool,
}

impl Subsystems {
    pub const ALL: Subsystems = Subsystems {
        broker: true,
        poller: true,
        workers: true,
    };
}

/// Input to `ImporterNode::update`.
#[derive(Debug, Clone)]
pub struct UpdateParams {
    /// Rebuild every service even if its fingerprint is unchanged.
    pub force_refresh: bool,
    pub config: NodeConfig,
}

/// Manager of the importer services on one machine.
pub struct ImporterNode<'a> {
    config: NodeConfig,
    state: NodeState,
    backend: &'a dyn ServiceBackend,
    fs: &'a dyn FsOps,
    cloner: &'a dyn SourceCloner,
}

impl<'a> ImporterNode<'a> {
    /// Create an uninitialized node. `install` must run before any other
    /// lifecycle operation.
    pub fn new(
        config: NodeConfig,
        backend: &'a dyn ServiceBackend,
        fs: &'a dyn FsOps,
        cloner: &'a dyn SourceCloner,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: NodeState::Uninitialized,
            backend,
            fs,
            cloner,
        })
    }

    /// Rebuild an installed node from recorded configuration.
    ///
    /// Instances are recomputed deterministically (unit names and
    /// fingerprints derive from the config); liveness is probed from the
    /// backend.
    pub fn adopt(
        config: NodeConfig,
        backend: &'a dyn ServiceBackend,
        fs: &'a dyn FsOps,
        cloner: &'a dyn SourceCloner,
    ) -> anyhow::Result<Self> {
        config.validate()?;

        let adopt_instance = |kind: ServiceKind, index: usize, spec: &UnitSpec| {
            let unit_name = unit::unit_name(kind, config.node_id, index);
            let running = backend.is_running(&unit_name);
            ServiceInstance {
                kind,
                unit_name,
                running,
                fingerprint: spec.fingerprint(),
            }
        };

        let workers = (0..config.worker_count)
            .map(|index| adopt_instance(ServiceKind::Worker, index, &unit::worker_spec(&config, index)))
            .collect();

        let topology = match &config.role {
            RoleConfig::Primary(primary) => Topology::Primary {
                broker: Some(adopt_instance(
                    ServiceKind::Broker,
                    0,
                    &unit::broker_spec(&config, primary),
                )),
                poller: Some(adopt_instance(
                    ServiceKind::Poller,
                    0,
                    &unit::poller_spec(&config, primary),
                )),
                workers,
            },
            RoleConfig::Secondary(_) => Topology::Secondary { workers },
        };

        Ok(Self {
            config,
            state: NodeState::Installed(topology),
            backend,
            fs,
            cloner,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn state(&self) -> &NodeState {
        &self.state
    }

    pub fn is_installed(&self) -> bool {
        matches!(self.state, NodeState::Installed(_))
    }

    pub fn backend(&self) -> &dyn ServiceBackend {
        self.backend
    }

    /// All managed services in start order: broker, poller, then workers.
    pub fn services(&self) -> Vec<&ServiceInstance> {
        match &self.state {
            NodeState::Uninitialized => Vec::new(),
            NodeState::Installed(Topology::Primary {
                broker,
                poller,
                workers,
            }) => broker
                .iter()
                .chain(poller.iter())
                .chain(workers.iter())
                .collect(),
            NodeState::Installed(Topology::Secondary { workers }) => workers.iter().collect(),
        }
    }

    // --- Lifecycle ---

    /// First-time creation of all owned services.
    ///
    /// A primary additionally prepares its data directory and reference
    /// source checkout before any unit exists. There is no rollback of
    /// partially created services; re-invoking `install` converges.
    pub fn install(&mut self) -> anyhow::Result<()> {
        if self.is_installed() {
            anyhow::bail!("node is already installed; use update to reconcile");
        }
        info!(
            role = %self.config.node_role(),
            node_id = self.config.node_id,
            workers = self.config.worker_count,
            "installing node"
        );

        let topology = match self.config.role.clone() {
            RoleConfig::Primary(primary) => {
                self.fs
                    .ensure_dir(&primary.data_directory, Some(&self.config.system_user))?;
                self.fs
                    .ensure_dir(&primary.source_directory, Some(&self.config.system_user))?;
                let checkout = primary.source_directory.join(source::CHECKOUT_DIR);
                self.cloner.clone_or_update(
                    &checkout,
                    &primary.source_url,
                    self.config.clone_proxy(),
                )?;

                let broker = self
                    .create_singleton(ServiceKind::Broker, unit::broker_spec(&self.config, &primary))?;
                let poller = self
                    .create_singleton(ServiceKind::Poller, unit::poller_spec(&self.config, &primary))?;
                Topology::Primary {
                    broker: Some(broker),
                    poller: Some(poller),
                    workers: self.create_workers()?,
                }
            }
            RoleConfig::Secondary(_) => Topology::Secondary {
                workers: self.create_workers()?,
            },
        };

        self.state = NodeState::Installed(topology);
        info!("node installed");
        Ok(())
    }

    /// Start all owned services: broker first, then poller, then workers.
    pub fn start(&mut self) -> anyhow::Result<()> {
        self.start_subsystems(Subsystems::ALL)
    }

    pub fn start_subsystems(&mut self, which: Subsystems) -> anyhow::Result<()> {
        let backend = self.backend;
        match self.topology_mut()? {
            Topology::Primary {
                broker,
                poller,
                workers,
            } => {
                // Broker first: workers connect to it on startup.
                if which.broker {
                    Self::start_slot(backend, broker)?;
                }
                if which.poller {
                    Self::start_slot(backend, poller)?;
                }
                if which.workers {
                    for worker in workers {
                        Self::start_instance(backend, worker)?;
                    }
                }
            }
            Topology::Secondary { workers } => {
                if which.workers {
                    for worker in workers {
                        Self::start_instance(backend, worker)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Stop all owned services: workers first, then poller, then broker.
    pub fn stop(&mut self) -> anyhow::Result<()> {
        self.stop_subsystems(Subsystems::ALL)
    }

    pub fn stop_subsystems(&mut self, which: Subsystems) -> anyhow::Result<()> {
        let backend = self.backend;
        match self.topology_mut()? {
            Topology::Primary {
                broker,
                poller,
                workers,
            } => {
                if which.workers {
                    for worker in workers {
                        Self::stop_instance(backend, worker)?;
                    }
                }
                if which.poller {
                    Self::stop_slot(backend, poller)?;
                }
                if which.broker {
                    Self::stop_slot(backend, broker)?;
                }
            }
            Topology::Secondary { workers } => {
                if which.workers {
                    for worker in workers {
                        Self::stop_instance(backend, worker)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Remove owned services and their unit definitions.
    pub fn destroy(&mut self) -> anyhow::Result<()> {
        self.destroy_subsystems(Subsystems::ALL)
    }

    pub fn destroy_subsystems(&mut self, which: Subsystems) -> anyhow::Result<()> {
        let backend = self.backend;
        match self.topology_mut()? {
            Topology::Primary {
                broker,
                poller,
                workers,
            } => {
                if which.workers {
                    Self::teardown_workers(backend, workers)?;
                }
                if which.poller {
                    Self::teardown_slot(backend, poller)?;
                }
                if which.broker {
                    Self::teardown_slot(backend, broker)?;
                }
            }
            Topology::Secondary { workers } => {
                if which.workers {
                    Self::teardown_workers(backend, workers)?;
                }
            }
        }
        if which == Subsystems::ALL {
            self.state = NodeState::Uninitialized;
            info!("node destroyed");
        }
        Ok(())
    }

    // --- Reconciliation ---

    /// Converge the live topology to `params.config`.
    ///
    /// Order is fixed: directory relocations, then worker scaling, then
    /// refresh-in-place of surviving workers, then broker/poller refresh.
    /// Scaling precedes refresh so a refresh only ever touches workers that
    /// will survive; relocations precede everything because they rebuild
    /// the singletons themselves.
    pub fn update(&mut self, params: UpdateParams) -> anyhow::Result<()> {
        let UpdateParams {
            force_refresh,
            config: desired,
        } = params;
        desired.validate()?;
        if !self.is_installed() {
            anyhow::bail!("node is not initialized");
        }
        if desired.node_role() != self.config.node_role() {
            anyhow::bail!(
                "role change ({} -> {}) requires destroy and reinstall",
                self.config.node_role(),
                desired.node_role()
            );
        }

        info!(
            node_id = desired.node_id,
            workers = desired.worker_count,
            force = force_refresh,
            "reconciling node"
        );

        let relocated = if desired.node_role() == NodeRole::Primary {
            self.relocate_directories(&desired)?
        } else {
            RelocationOutcome::default()
        };

        self.scale_workers(&desired)?;
        self.refresh_workers(&desired, force_refresh)?;

        if let RoleConfig::Primary(primary) = &desired.role {
            let broker_spec = unit::broker_spec(&desired, primary);
            let poller_spec = unit::poller_spec(&desired, primary);
            let backend = self.backend;
            if let Topology::Primary { broker, poller, .. } = self.topology_mut()? {
                if !relocated.broker_rebuilt {
                    Self::refresh_slot(backend, broker, ServiceKind::Broker, &broker_spec, force_refresh)?;
                }
                if !relocated.poller_rebuilt {
                    Self::refresh_slot(backend, poller, ServiceKind::Poller, &poller_spec, force_refresh)?;
                }
            }
        }

        self.config = desired;
        info!("reconciliation complete");
        Ok(())
    }

    /// Bring the worker set to the desired count.
    ///
    /// Scale-down destroys from the tail (LIFO); scale-up appends at the
    /// next index with units built from the new parameters, so the refresh
    /// pass never rebuilds them redundantly.
    fn scale_workers(&mut self, desired: &NodeConfig) -> anyhow::Result<()> {
        let backend = self.backend;
        let workers = self.workers_mut()?;

        while workers.len() > desired.worker_count {
            let Some(instance) = workers.last_mut() else {
                break;
            };
            if instance.running {
                backend.stop(&instance.unit_name)?;
                instance.running = false;
            }
            backend.destroy(&instance.unit_name)?;
            if let Some(removed) = workers.pop() {
                info!(unit = %removed.unit_name, "removed worker");
            }
        }

        while workers.len() < desired.worker_count {
            let index = workers.len();
            let spec = unit::worker_spec(desired, index);
            let name = unit::unit_name(ServiceKind::Worker, desired.node_id, index);
            backend
                .create(&name, &spec)
                .with_context(|| format!("failed to create worker unit {name}"))?;
            info!(unit = %name, "added worker");
            workers.push(ServiceInstance::new(ServiceKind::Worker, name, &spec));
        }
        Ok(())
    }

    /// Destroy and recreate every surviving worker whose baked-in
    /// configuration no longer matches the desired spec.
    fn refresh_workers(&mut self, desired: &NodeConfig, force: bool) -> anyhow::Result<()> {
        let backend = self.backend;
        let workers = self.workers_mut()?;

        for (index, instance) in workers.iter_mut().enumerate() {
            let spec = unit::worker_spec(desired, index);
            let name = unit::unit_name(ServiceKind::Worker, desired.node_id, index);
            let needs_refresh =
                force || instance.fingerprint != spec.fingerprint() || instance.unit_name != name;
            if !needs_refresh {
                continue;
            }
            Self::rebuild(backend, instance, name, &spec)?;
        }
        Ok(())
    }

    // --- Helpers ---

    fn topology_mut(&mut self) -> anyhow::Result<&mut Topology> {
        match &mut self.state {
            NodeState::Installed(topology) => Ok(topology),
            NodeState::Uninitialized => Err(anyhow::anyhow!("node is not initialized")),
        }
    }

    fn workers_mut(&mut self) -> anyhow::Result<&mut Vec<ServiceInstance>> {
        match self.topology_mut()? {
            Topology::Primary { workers, .. } => Ok(workers),
            Topology::Secondary { workers } => Ok(workers),
        }
    }

    fn create_singleton(
        &self,
        kind: ServiceKind,
        spec: UnitSpec,
    ) -> anyhow::Result<ServiceInstance> {
        let name = unit::unit_name(kind, self.config.node_id, 0);
        self.backend
            .create(&name, &spec)
            .with_context(|| format!("failed to create {kind} unit"))?;
        Ok(ServiceInstance::new(kind, name, &spec))
    }

    fn create_workers(&self) -> anyhow::Result<Vec<ServiceInstance>> {
        (0..self.config.worker_count)
            .map(|index| {
                let spec = unit::worker_spec(&self.config, index);
                let name = unit::unit_name(ServiceKind::Worker, self.config.node_id, index);
                self.backend
                    .create(&name, &spec)
                    .with_context(|| format!("failed to create worker unit {name}"))?;
                Ok(ServiceInstance::new(ServiceKind::Worker, name, &spec))
            })
            .collect()
    }

    fn start_instance(
        backend: &dyn ServiceBackend,
        instance: &mut ServiceInstance,
    ) -> anyhow::Result<()> {
        backend
            .start(&instance.unit_name)
            .with_context(|| format!("failed to start {}", instance.unit_name))?;
        instance.running = true;
        Ok(())
    }

    fn stop_instance(
        backend: &dyn ServiceBackend,
        instance: &mut ServiceInstance,
    ) -> anyhow::Result<()> {
        backend
            .stop(&instance.unit_name)
            .with_context(|| format!("failed to stop {}", instance.unit_name))?;
        instance.running = false;
        Ok(())
    }

    fn start_slot(
        backend: &dyn ServiceBackend,
        slot: &mut Option<ServiceInstance>,
    ) -> anyhow::Result<()> {
        if let Some(instance) = slot {
            Self::start_instance(backend, instance)?;
        }
        Ok(())
    }

    fn stop_slot(
        backend: &dyn ServiceBackend,
        slot: &mut Option<ServiceInstance>,
    ) -> anyhow::Result<()> {
        if let Some(instance) = slot {
            Self::stop_instance(backend, instance)?;
        }
        Ok(())
    }

    /// Stop (if running) and destroy one singleton, emptying its slot.
    fn teardown_slot(
        backend: &dyn ServiceBackend,
        slot: &mut Option<ServiceInstance>,
    ) -> anyhow::Result<()> {
        if let Some(instance) = slot {
            if instance.running {
                backend
                    .stop(&instance.unit_name)
                    .with_context(|| format!("failed to stop {}", instance.unit_name))?;
                instance.running = false;
            }
            backend
                .destroy(&instance.unit_name)
                .with_context(|| format!("failed to destroy {}", instance.unit_name))?;
            *slot = None;
        }
        Ok(())
    }

    /// Destroy all workers from the tail down.
    fn teardown_workers(
        backend: &dyn ServiceBackend,
        workers: &mut Vec<ServiceInstance>,
    ) -> anyhow::Result<()> {
        while let Some(instance) = workers.last_mut() {
            if instance.running {
                backend
                    .stop(&instance.unit_name)
                    .with_context(|| format!("failed to stop {}", instance.unit_name))?;
                instance.running = false;
            }
            backend
                .destroy(&instance.unit_name)
                .with_context(|| format!("failed to destroy {}", instance.unit_name))?;
            workers.pop();
        }
        Ok(())
    }

    /// Destroy and recreate one service under a (possibly new) unit name,
    /// restoring its previous running state.
    ///
    /// The instance is mutated only after each backend call succeeds, so a
    /// failure part-way leaves the model accurate for the next retry.
    fn rebuild(
        backend: &dyn ServiceBackend,
        instance: &mut ServiceInstance,
        new_name: String,
        spec: &UnitSpec,
    ) -> anyhow::Result<()> {
        let was_running = instance.running;
        if was_running {
            backend
                .stop(&instance.unit_name)
                .with_context(|| format!("failed to stop {}", instance.unit_name))?;
            instance.running = false;
        }
        backend
            .destroy(&instance.unit_name)
            .with_context(|| format!("failed to destroy {}", instance.unit_name))?;
        backend
            .create(&new_name, spec)
            .with_context(|| format!("failed to recreate {new_name}"))?;
        info!(unit = %new_name, "rebuilt service");
        instance.unit_name = new_name;
        instance.fingerprint = spec.fingerprint();
        if was_running {
            backend
                .start(&instance.unit_name)
                .with_context(|| format!("failed to start {}", instance.unit_name))?;
            instance.running = true;
        }
        Ok(())
    }

    /// Refresh one primary singleton in place, or recreate it if the slot
    /// is empty (e.g. after an interrupted earlier pass).
    fn refresh_slot(
        backend: &dyn ServiceBackend,
        slot: &mut Option<ServiceInstance>,
        kind: ServiceKind,
        spec: &UnitSpec,
        force: bool,
    ) -> anyhow::Result<()> {
        match slot {
            Some(instance) => {
                if force || instance.fingerprint != spec.fingerprint() {
                    let name = instance.unit_name.clone();
                    Self::rebuild(backend, instance, name, spec)?;
                }
            }
            None => {
                let name = unit::unit_name(kind, 0, 0);
                backend
                    .create(&name, spec)
                    .with_context(|| format!("failed to recreate {kind} unit"))?;
                *slot = Some(ServiceInstance::new(kind, name, spec));
            }
        }
        Ok(())
    }
}
