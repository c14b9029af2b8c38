//! Driver operations mapping external triggers to node lifecycle calls.
//!
//! Each function adopts the node from recorded state, performs exactly one
//! lifecycle operation, and commits the new recorded state on success. The
//! surrounding event source is expected to serialize triggers per node;
//! nothing here is re-entrant.

use anyhow::Context;
use tracing::info;

use crate::commands::context::DriverContext;
use crate::config::NodeConfig;
use crate::node::{ImporterNode, Subsystems, UpdateParams};
use crate::status::NodeStatus;

/// First-time install from a desired configuration.
pub fn install(ctx: &DriverContext<'_>, desired: NodeConfig) -> anyhow::Result<()> {
    if ctx.state().exists() {
        anyhow::bail!("node is already installed; use update to reconcile");
    }
    let mut node = ImporterNode::new(desired, ctx.backend(), ctx.fs(), ctx.cloner())?;
    node.install()?;
    ctx.state()
        .save(node.config())
        .context("install succeeded but recording state failed")?;
    Ok(())
}

/// Reconcile the node against a new desired configuration.
///
/// A role flip cannot be reconciled in place: the old node is fully
/// destroyed and a node of the new role installed fresh.
pub fn update(ctx: &DriverContext<'_>, desired: NodeConfig, force_refresh: bool) -> anyhow::Result<()> {
    let recorded = ctx
        .state()
        .load()?
        .context("node is not installed; run install first")?;

    if recorded.node_role() != desired.node_role() {
        info!(
            from = %recorded.node_role(),
            to = %desired.node_role(),
            "role changed, rebuilding node from scratch"
        );
        let mut old = ImporterNode::adopt(recorded, ctx.backend(), ctx.fs(), ctx.cloner())?;
        old.destroy()?;
        ctx.state().clear()?;

        let mut node = ImporterNode::new(desired, ctx.backend(), ctx.fs(), ctx.cloner())?;
        node.install()?;
        ctx.state()
            .save(node.config())
            .context("install succeeded but recording state failed")?;
        return Ok(());
    }

    let mut node = ImporterNode::adopt(recorded, ctx.backend(), ctx.fs(), ctx.cloner())?;
    node.update(UpdateParams {
        force_refresh,
        config: desired,
    })?;
    ctx.state()
        .save(node.config())
        .context("update succeeded but recording state failed")?;
    Ok(())
}

/// Start the recorded node's services.
pub fn start(ctx: &DriverContext<'_>, which: Subsystems) -> anyhow::Result<()> {
    let mut node = adopt_recorded(ctx)?;
    node.start_subsystems(which)
}

/// Stop the recorded node's services.
pub fn stop(ctx: &DriverContext<'_>, which: Subsystems) -> anyhow::Result<()> {
    let mut node = adopt_recorded(ctx)?;
    node.stop_subsystems(which)
}

/// Destroy the recorded node and forget its state.
pub fn destroy(ctx: &DriverContext<'_>) -> anyhow::Result<()> {
    let mut node = adopt_recorded(ctx)?;
    node.destroy()?;
    ctx.state().clear()
}

/// Collect a live status report for the recorded node.
pub fn status(ctx: &DriverContext<'_>) -> anyhow::Result<NodeStatus> {
    let node = adopt_recorded(ctx)?;
    NodeStatus::collect(&node)
}

fn adopt_recorded<'a>(ctx: &DriverContext<'a>) -> anyhow::Result<ImporterNode<'a>> {
    let recorded = ctx
        .state()
        .load()?
        .context("node is not installed; run install first")?;
    ImporterNode::adopt(recorded, ctx.backend(), ctx.fs(), ctx.cloner())
}
