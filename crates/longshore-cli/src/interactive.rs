//! Interactive confirmation prompts.
//!
//! Uses dialoguer for terminal UI prompts.

use anyhow::Result;
use dialoguer::{Confirm, theme::ColorfulTheme};

/// Ask the operator to confirm a full node destroy.
pub fn confirm_destroy() -> Result<bool> {
    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Destroy all managed services and forget recorded state?")
        .default(false)
        .interact()?;
    Ok(confirmed)
}
