//! Relocation of a primary's persistent directories.
//!
//! Both protocols follow the same shape: stop only the affected services,
//! mutate the filesystem, destroy the affected unit definitions, recreate
//! them with the new path baked in, and only then commit the new path to
//! the recorded configuration. A crash mid-relocation therefore leaves
//! either the old, fully-functional configuration or a clearly incomplete
//! new one, never a recorded path that disagrees with what the running
//! services were told.

use anyhow::Context;
use tracing::info;

use crate::config::NodeConfig;
use crate::node::{ImporterNode, ServiceInstance, Topology};
use crate::source;
use crate::types::ServiceKind;
use crate::unit::{self, UnitSpec};

/// Name of the working database file inside the data directory.
pub const DB_FILE: &str = "importer.db";

/// Which singletons a relocation pass already rebuilt, so the update
/// refresh pass does not rebuild them a second time.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RelocationOutcome {
    pub broker_rebuilt: bool,
    pub poller_rebuilt: bool,
}

impl ImporterNode<'_> {
    /// Run both relocations if the corresponding desired paths changed.
    /// Data moves before source: the data protocol rebuilds the poller too,
    /// and must see the source tree where it currently lives.
    pub(crate) fn relocate_directories(
        &mut self,
        desired: &NodeConfig,
    ) -> anyhow::Result<RelocationOutcome> {
        let mut outcome = RelocationOutcome::default();
        if self.relocate_data_directory(desired)? {
            outcome.broker_rebuilt = true;
            outcome.poller_rebuilt = true;
        }
        if self.relocate_source_directory(desired)? {
            outcome.poller_rebuilt = true;
        }
        Ok(outcome)
    }

    /// Move the working database to a new data directory.
    ///
    /// Returns `Ok(false)` without touching anything when the desired path
    /// equals the recorded one. Workers are excluded throughout: they do
    /// not depend on the data directory.
    pub fn relocate_data_directory(&mut self, desired: &NodeConfig) -> anyhow::Result<bool> {
        let desired_primary = desired
            .primary()
            .context("data directory relocation applies to primary nodes only")?;
        if !self.is_installed() {
            anyhow::bail!("node is not initialized");
        }
        let current = self.config.primary().context("node is not a primary")?;
        let old_dir = current.data_directory.clone();
        let recorded_source = current.source_directory.clone();
        let new_dir = desired_primary.data_directory.clone();
        if old_dir == new_dir {
            return Ok(false);
        }

        info!(
            from = %old_dir.display(),
            to = %new_dir.display(),
            "relocating data directory"
        );

        let backend = self.backend;
        let fs = self.fs;

        // 1. The target must exist with the right ownership before any
        //    service is disturbed.
        fs.ensure_dir(&new_dir, Some(&desired.system_user))?;

        // 2. Stop the services that hold the database open.
        let (broker_was_running, poller_was_running);
        {
            let Topology::Primary { broker, poller, .. } = self.topology_mut()? else {
                anyhow::bail!("node is not a primary");
            };
            broker_was_running = broker.as_ref().is_some_and(|i| i.running);
            poller_was_running = poller.as_ref().is_some_and(|i| i.running);
            Self::stop_slot(backend, broker)?;
            Self::stop_slot(backend, poller)?;
        }

        // 3. A database already present at the target wins; otherwise move
        //    (rename, never copy) the existing one.
        let old_db = old_dir.join(DB_FILE);
        let new_db = new_dir.join(DB_FILE);
        if fs.exists(&new_db) {
            info!(path = %new_db.display(), "target already holds a database, keeping it");
        } else if fs.exists(&old_db) {
            fs.move_file(&old_db, &new_db)
                .context("failed to move database to new data directory")?;
            info!(from = %old_db.display(), to = %new_db.display(), "moved database");
        } else {
            info!("no database present yet, nothing to move");
        }

        // 4. Destroy the old unit definitions, commit the new path, and
        //    recreate with it baked in.
        {
            let Topology::Primary { broker, poller, .. } = self.topology_mut()? else {
                anyhow::bail!("node is not a primary");
            };
            Self::teardown_slot(backend, broker)?;
            Self::teardown_slot(backend, poller)?;
        }
        if let Some(primary) = self.config.primary_mut() {
            primary.data_directory = new_dir.clone();
        }

        let mut spec_primary = desired_primary.clone();
        spec_primary.data_directory = new_dir;
        // A source relocation is its own protocol; specs here keep the
        // source tree where it currently lives.
        spec_primary.source_directory = recorded_source;
        let broker_spec = unit::broker_spec(desired, &spec_primary);
        let poller_spec = unit::poller_spec(desired, &spec_primary);

        {
            let Topology::Primary { broker, poller, .. } = self.topology_mut()? else {
                anyhow::bail!("node is not a primary");
            };
            Self::recreate_slot(backend, broker, ServiceKind::Broker, &broker_spec, broker_was_running)?;
            Self::recreate_slot(backend, poller, ServiceKind::Poller, &poller_spec, poller_was_running)?;
        }

        info!("data directory relocation complete");
        Ok(true)
    }

    /// Re-clone the reference source tree under a new source directory.
    ///
    /// Only the poller reads this tree, so only the poller is disturbed.
    /// The checkout is always refreshed, never merged.
    pub fn relocate_source_directory(&mut self, desired: &NodeConfig) -> anyhow::Result<bool> {
        let desired_primary = desired
            .primary()
            .context("source directory relocation applies to primary nodes only")?;
        if !self.is_installed() {
            anyhow::bail!("node is not initialized");
        }
        let current = self.config.primary().context("node is not a primary")?;
        let old_dir = current.source_directory.clone();
        let recorded_data = current.data_directory.clone();
        let new_dir = desired_primary.source_directory.clone();
        if old_dir == new_dir {
            return Ok(false);
        }

        info!(
            from = %old_dir.display(),
            to = %new_dir.display(),
            "relocating source directory"
        );

        let backend = self.backend;
        let fs = self.fs;

        // 1.
        fs.ensure_dir(&new_dir, Some(&desired.system_user))?;

        // 2. Stop the poller only.
        let poller_was_running;
        {
            let Topology::Primary { poller, .. } = self.topology_mut()? else {
                anyhow::bail!("node is not a primary");
            };
            poller_was_running = poller.as_ref().is_some_and(|i| i.running);
            Self::stop_slot(backend, poller)?;
        }

        // 3. Clear any previous checkout at the target, then clone fresh.
        //    A clone failure aborts before the recorded path changes.
        let checkout = new_dir.join(source::CHECKOUT_DIR);
        if fs.exists(&checkout) {
            fs.remove_dir_all(&checkout)
                .context("failed to remove stale checkout at target")?;
        }
        self.cloner
            .clone_or_update(&checkout, &desired_primary.source_url, desired.clone_proxy())
            .context("failed to clone reference source")?;

        // 4. Rebuild the poller against the new tree, committing the path
        //    only once the clone has succeeded.
        {
            let Topology::Primary { poller, .. } = self.topology_mut()? else {
                anyhow::bail!("node is not a primary");
            };
            Self::teardown_slot(backend, poller)?;
        }
        if let Some(primary) = self.config.primary_mut() {
            primary.source_directory = new_dir.clone();
            primary.source_url = desired_primary.source_url.clone();
        }

        let mut spec_primary = desired_primary.clone();
        spec_primary.source_directory = new_dir;
        spec_primary.data_directory = recorded_data;
        let poller_spec = unit::poller_spec(desired, &spec_primary);

        {
            let Topology::Primary { poller, .. } = self.topology_mut()? else {
                anyhow::bail!("node is not a primary");
            };
            Self::recreate_slot(backend, poller, ServiceKind::Poller, &poller_spec, poller_was_running)?;
        }

        info!("source directory relocation complete");
        Ok(true)
    }

    /// Create a singleton into an empty slot, starting it if requested.
    fn recreate_slot(
        backend: &dyn crate::backend::ServiceBackend,
        slot: &mut Option<ServiceInstance>,
        kind: ServiceKind,
        spec: &UnitSpec,
        start: bool,
    ) -> anyhow::Result<()> {
        let name = unit::unit_name(kind, 0, 0);
        backend
            .create(&name, spec)
            .with_context(|| format!("failed to recreate {kind} unit"))?;
        *slot = Some(ServiceInstance {
            kind,
            unit_name: name.clone(),
            running: false,
            fingerprint: spec.fingerprint(),
        });
        if start {
            backend
                .start(&name)
                .with_context(|| format!("failed to start {name}"))?;
            if let Some(instance) = slot {
                instance.running = true;
            }
        }
        Ok(())
    }
}
