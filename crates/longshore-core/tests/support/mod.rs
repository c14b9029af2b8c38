//! Shared test doubles: a recording service backend, a chown-free
//! filesystem, and a recording source cloner.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use longshore_core::backend::ServiceBackend;
use longshore_core::config::{
    NodeConfig, PrimaryConfig, ProxyConfig, RoleConfig, SecondaryConfig,
};
use longshore_core::fsops::{FsError, FsOps, FsResult};
use longshore_core::source::SourceCloner;
use longshore_core::unit::UnitSpec;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Create(String),
    Start(String),
    Stop(String),
    Destroy(String),
}

/// In-memory service backend that records every call and can be scripted
/// to fail on a specific unit.
#[derive(Default)]
pub struct MockBackend {
    calls: RefCell<Vec<BackendCall>>,
    units: RefCell<HashMap<String, String>>,
    running: RefCell<HashSet<String>>,
    fail_create: RefCell<Option<String>>,
    fail_start: RefCell<Option<String>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn created_units(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                BackendCall::Create(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn destroyed_units(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                BackendCall::Destroy(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn create_count(&self) -> usize {
        self.created_units().len()
    }

    pub fn destroy_count(&self) -> usize {
        self.destroyed_units().len()
    }

    /// Unit names with a live definition, sorted.
    pub fn unit_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.units.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn has_unit(&self, name: &str) -> bool {
        self.units.borrow().contains_key(name)
    }

    pub fn fingerprint_of(&self, name: &str) -> Option<String> {
        self.units.borrow().get(name).cloned()
    }

    pub fn mark_running(&self, name: &str) {
        self.running.borrow_mut().insert(name.to_string());
    }

    pub fn fail_create_on(&self, name: &str) {
        *self.fail_create.borrow_mut() = Some(name.to_string());
    }

    pub fn fail_start_on(&self, name: &str) {
        *self.fail_start.borrow_mut() = Some(name.to_string());
    }

    pub fn clear_failures(&self) {
        *self.fail_create.borrow_mut() = None;
        *self.fail_start.borrow_mut() = None;
    }
}

impl ServiceBackend for MockBackend {
    fn create(&self, unit_name: &str, spec: &UnitSpec) -> anyhow::Result<()> {
        self.calls
            .borrow_mut()
            .push(BackendCall::Create(unit_name.to_string()));
        if self.fail_create.borrow().as_deref() == Some(unit_name) {
            anyhow::bail!("injected create failure for {unit_name}");
        }
        self.units
            .borrow_mut()
            .insert(unit_name.to_string(), spec.fingerprint());
        Ok(())
    }

    fn start(&self, unit_name: &str) -> anyhow::Result<()> {
        self.calls
            .borrow_mut()
            .push(BackendCall::Start(unit_name.to_string()));
        if self.fail_start.borrow().as_deref() == Some(unit_name) {
            anyhow::bail!("injected start failure for {unit_name}");
        }
        self.running.borrow_mut().insert(unit_name.to_string());
        Ok(())
    }

    fn stop(&self, unit_name: &str) -> anyhow::Result<()> {
        self.calls
            .borrow_mut()
            .push(BackendCall::Stop(unit_name.to_string()));
        self.running.borrow_mut().remove(unit_name);
        Ok(())
    }

    fn destroy(&self, unit_name: &str) -> anyhow::Result<()> {
        self.calls
            .borrow_mut()
            .push(BackendCall::Destroy(unit_name.to_string()));
        self.units.borrow_mut().remove(unit_name);
        self.running.borrow_mut().remove(unit_name);
        Ok(())
    }

    fn is_running(&self, unit_name: &str) -> bool {
        self.running.borrow().contains(unit_name)
    }
}

/// Real filesystem without the chown step, for tempdir-backed tests.
#[derive(Debug, Default)]
pub struct TestFs;

impl FsOps for TestFs {
    fn ensure_dir(&self, path: &Path, _owner: Option<&str>) -> FsResult<()> {
        if path.exists() {
            if path.is_dir() {
                return Ok(());
            }
            return Err(FsError::NotADirectory {
                path: path.display().to_string(),
            });
        }
        std::fs::create_dir_all(path).map_err(FsError::Io)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn move_file(&self, from: &Path, to: &Path) -> FsResult<()> {
        std::fs::rename(from, to).map_err(FsError::Io)
    }

    fn remove_dir_all(&self, path: &Path) -> FsResult<()> {
        if !path.exists() {
            return Ok(());
        }
        std::fs::remove_dir_all(path).map_err(FsError::Io)
    }
}

/// Cloner that records calls and materializes a tiny checkout on success.
#[derive(Default)]
pub struct RecordingCloner {
    calls: RefCell<Vec<(PathBuf, String)>>,
    fail: Cell<bool>,
}

impl RecordingCloner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<(PathBuf, String)> {
        self.calls.borrow().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.set(fail);
    }
}

impl SourceCloner for RecordingCloner {
    fn clone_or_update(
        &self,
        target_dir: &Path,
        url: &str,
        _proxy: Option<&str>,
    ) -> anyhow::Result<()> {
        self.calls
            .borrow_mut()
            .push((target_dir.to_path_buf(), url.to_string()));
        if self.fail.get() {
            anyhow::bail!("injected clone failure");
        }
        std::fs::create_dir_all(target_dir)?;
        std::fs::write(target_dir.join("ALLOWLIST"), "example-package\n")?;
        Ok(())
    }
}

// --- Config fixtures ---

pub const SOURCE_URL: &str = "https://git.example.com/import-filters.git";

/// Primary config with data/source directories rooted under `root`.
pub fn primary_config(root: &Path) -> NodeConfig {
    NodeConfig {
        node_id: 0,
        worker_count: 2,
        system_user: "importer".to_string(),
        publish_enabled: true,
        primary_port: 1692,
        importer_binary: PathBuf::from("/usr/local/bin/pkg-importer"),
        credentials_file: None,
        proxy: ProxyConfig::default(),
        role: RoleConfig::Primary(PrimaryConfig {
            data_directory: root.join("data"),
            source_directory: root.join("source"),
            source_url: SOURCE_URL.to_string(),
        }),
    }
}

pub fn secondary_config() -> NodeConfig {
    NodeConfig {
        node_id: 1,
        worker_count: 1,
        system_user: "importer".to_string(),
        publish_enabled: true,
        primary_port: 1692,
        importer_binary: PathBuf::from("/usr/local/bin/pkg-importer"),
        credentials_file: None,
        proxy: ProxyConfig::default(),
        role: RoleConfig::Secondary(SecondaryConfig {
            primary_endpoint: "tcp://10.0.0.5:1692".to_string(),
        }),
    }
}
