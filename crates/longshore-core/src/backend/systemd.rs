//! systemd implementation of the service backend.
//!
//! Thin OS glue: unit files are written under the system unit directory with
//! a `longshore-` prefix and driven through `systemctl`. Process failures
//! are converted to errors with the captured stderr here, at the narrowest
//! point, so nothing OS-specific leaks into the reconciliation core.

use std::path::PathBuf;
use std::process::Command;

use anyhow::Context;
use tracing::{debug, error, info};

use crate::backend::ServiceBackend;
use crate::unit::UnitSpec;

const UNIT_DIR: &str = "/etc/systemd/system";
const UNIT_PREFIX: &str = "longshore-";

#[derive(Debug)]
pub struct SystemdBackend {
    unit_dir: PathBuf,
}

impl Default for SystemdBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemdBackend {
    pub fn new() -> Self {
        Self::with_unit_dir(PathBuf::from(UNIT_DIR))
    }

    /// Use a non-default unit directory (e.g. for sandboxed environments).
    pub fn with_unit_dir(unit_dir: PathBuf) -> Self {
        Self { unit_dir }
    }

    fn service_name(unit_name: &str) -> String {
        format!("{UNIT_PREFIX}{unit_name}.service")
    }

    fn unit_file(&self, unit_name: &str) -> PathBuf {
        self.unit_dir.join(Self::service_name(unit_name))
    }

    fn systemctl(args: &[&str]) -> anyhow::Result<()> {
        let output = Command::new("systemctl")
            .args(args)
            .output()
            .with_context(|| format!("Failed to invoke systemctl {}", args.join(" ")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(args = args.join(" "), stderr = %stderr.trim(), "systemctl failed");
            anyhow::bail!(
                "systemctl {} failed: {}",
                args.join(" "),
                stderr.trim()
            );
        }
        Ok(())
    }

    fn daemon_reload() -> anyhow::Result<()> {
        Self::systemctl(&["daemon-reload"])
    }
}

impl ServiceBackend for SystemdBackend {
    fn create(&self, unit_name: &str, spec: &UnitSpec) -> anyhow::Result<()> {
        let path = self.unit_file(unit_name);
        let mut contents = spec.render();
        contents.push('\n');
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write unit file: {}", path.display()))?;
        Self::daemon_reload()?;
        info!(unit = unit_name, path = %path.display(), "created unit");
        Ok(())
    }

    fn start(&self, unit_name: &str) -> anyhow::Result<()> {
        let name = Self::service_name(unit_name);
        if self.is_running(unit_name) {
            debug!(unit = unit_name, "already running");
            return Ok(());
        }
        Self::systemctl(&["start", &name])
            .with_context(|| format!("Failed to start {name}"))?;
        info!(unit = unit_name, "started");
        Ok(())
    }

    fn stop(&self, unit_name: &str) -> anyhow::Result<()> {
        if !self.unit_file(unit_name).exists() {
            debug!(unit = unit_name, "no unit definition, nothing to stop");
            return Ok(());
        }
        let name = Self::service_name(unit_name);
        if !self.is_running(unit_name) {
            debug!(unit = unit_name, "already stopped");
            return Ok(());
        }
        Self::systemctl(&["stop", &name]).with_context(|| format!("Failed to stop {name}"))?;
        info!(unit = unit_name, "stopped");
        Ok(())
    }

    fn destroy(&self, unit_name: &str) -> anyhow::Result<()> {
        let path = self.unit_file(unit_name);
        if !path.exists() {
            debug!(unit = unit_name, "no unit definition, nothing to destroy");
            return Ok(());
        }
        self.stop(unit_name)?;
        std::fs::remove_file(&path)
            .with_context(|| format!("Failed to remove unit file: {}", path.display()))?;
        Self::daemon_reload()?;
        info!(unit = unit_name, "destroyed unit");
        Ok(())
    }

    fn is_running(&self, unit_name: &str) -> bool {
        let name = Self::service_name(unit_name);
        Command::new("systemctl")
            .args(["is-active", "--quiet", &name])
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }
}
