//! Recorded-state persistence in the state directory.
//!
//! The node model itself needs no persisted manifest (unit names and
//! fingerprints are recomputable from configuration), so the only durable
//! record is the last successfully applied `NodeConfig`. The driver adopts
//! a node from it on every trigger.

use std::fs;
use std::path::PathBuf;

use anyhow::Context;

use crate::config::NodeConfig;

const STATE_FILE: &str = "node.toml";

/// Storage for the last applied node configuration.
#[derive(Debug, Clone)]
pub struct StateStore {
    state_dir: PathBuf,
}

impl StateStore {
    pub fn new(state_dir: PathBuf) -> Self {
        Self { state_dir }
    }

    /// Default state directory:
    /// `$XDG_STATE_HOME/longshore` or `~/.local/state/longshore`.
    pub fn default_state_dir() -> anyhow::Result<PathBuf> {
        let base = dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .ok_or_else(|| anyhow::anyhow!("Cannot determine state directory"))?;
        Ok(base.join("longshore"))
    }

    pub fn state_dir(&self) -> &PathBuf {
        &self.state_dir
    }

    fn state_path(&self) -> PathBuf {
        self.state_dir.join(STATE_FILE)
    }

    pub fn exists(&self) -> bool {
        self.state_path().exists()
    }

    /// Load the recorded configuration, or `None` if nothing was applied
    /// yet.
    pub fn load(&self) -> anyhow::Result<Option<NodeConfig>> {
        let path = self.state_path();
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;
        let config: NodeConfig = toml::from_str(&text)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;
        Ok(Some(config))
    }

    /// Save atomically (tmp + rename).
    pub fn save(&self, config: &NodeConfig) -> anyhow::Result<()> {
        fs::create_dir_all(&self.state_dir).with_context(|| {
            format!("Failed to create state directory: {}", self.state_dir.display())
        })?;

        let text = toml::to_string_pretty(config).context("Failed to serialize node state")?;
        let tmp_path = self
            .state_dir
            .join(format!("{}.tmp.{}", STATE_FILE, std::process::id()));
        fs::write(&tmp_path, text)
            .with_context(|| format!("Failed to write tmp state file: {}", tmp_path.display()))?;
        fs::rename(&tmp_path, self.state_path())
            .with_context(|| format!("Failed to rename tmp state file: {}", tmp_path.display()))?;
        Ok(())
    }

    /// Forget the recorded configuration (after a destroy).
    pub fn clear(&self) -> anyhow::Result<()> {
        let path = self.state_path();
        if !path.exists() {
            return Ok(());
        }
        fs::remove_file(&path)
            .with_context(|| format!("Failed to remove state file: {}", path.display()))
    }
}
