//! Reference-source cloning for the poller's allowlist/denylist tree.

use std::path::Path;
use std::process::Command;

use anyhow::Context;
use tracing::info;

/// Name of the checkout directory under the node's source directory.
pub const CHECKOUT_DIR: &str = "allowlist-denylist-source";

const GIT_ENV_OVERRIDES: [&str; 4] = [
    "GIT_DIR",
    "GIT_WORK_TREE",
    "GIT_INDEX_FILE",
    "GIT_COMMON_DIR",
];

/// Contract for materializing the reference source tree.
pub trait SourceCloner {
    /// Clone `url` into `target_dir`, or fast-forward an existing checkout.
    fn clone_or_update(
        &self,
        target_dir: &Path,
        url: &str,
        proxy: Option<&str>,
    ) -> anyhow::Result<()>;
}

/// Production cloner shelling out to git.
#[derive(Debug, Default)]
pub struct GitCloner;

impl GitCloner {
    pub fn new() -> Self {
        GitCloner
    }

    fn git_command(proxy: Option<&str>) -> Command {
        let mut cmd = Command::new("git");
        for key in GIT_ENV_OVERRIDES {
            cmd.env_remove(key);
        }
        if let Some(proxy) = proxy {
            cmd.env("https_proxy", proxy);
            cmd.env("http_proxy", proxy);
        }
        cmd
    }

    fn run(mut cmd: Command, action: &str) -> anyhow::Result<()> {
        let output = cmd
            .output()
            .with_context(|| format!("Failed to invoke git for {action}"))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("git {action} failed: {}", stderr.trim());
        }
        Ok(())
    }
}

impl SourceCloner for GitCloner {
    fn clone_or_update(
        &self,
        target_dir: &Path,
        url: &str,
        proxy: Option<&str>,
    ) -> anyhow::Result<()> {
        if target_dir.join(".git").exists() {
            info!(target = %target_dir.display(), "updating existing checkout");
            let mut cmd = Self::git_command(proxy);
            cmd.args(["-C"])
                .arg(target_dir)
                .args(["pull", "--ff-only", "--quiet"]);
            return Self::run(cmd, "pull");
        }

        info!(target = %target_dir.display(), url, "cloning reference source");
        let mut cmd = Self::git_command(proxy);
        cmd.args(["clone", "--quiet", url]).arg(target_dir);
        Self::run(cmd, "clone")
    }
}
