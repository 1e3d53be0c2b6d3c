//! Script command implementation.
//!
//! Render a step's job scripts into a workspace directory.

use std::path::Path;

use anyhow::{Context, Result};
use console::style;

use super::common::{create_adapter, load_step};

/// Execute the script command.
pub async fn execute(config: Option<&Path>, step: &Path, workspace: &Path) -> Result<()> {
    let adapter = create_adapter(config)?;
    let step = load_step(step)?;

    tokio::fs::create_dir_all(workspace)
        .await
        .with_context(|| format!("Failed to create workspace: {}", workspace.display()))?;

    let paths = adapter
        .write_script(workspace, &step)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to write script for '{}': {e}", step.name))?;

    let mode = if paths.to_be_scheduled {
        style("scheduled").cyan()
    } else {
        style("inline").yellow()
    };
    println!("{} {} ({mode})", style("✓").green().bold(), step.name);
    println!("  Script:  {}", paths.script.display());
    if let Some(restart) = &paths.restart {
        println!("  Restart: {}", restart.display());
    }

    Ok(())
}
