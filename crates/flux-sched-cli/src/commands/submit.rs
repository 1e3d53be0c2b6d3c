//! Submit command implementation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use console::style;

use flux_sched::SubmitOutcome;

use super::common::{create_adapter, load_step};

/// Execute the submit command.
pub async fn execute(
    config: Option<&Path>,
    step: &Path,
    script: &Path,
    cwd: Option<&Path>,
) -> Result<()> {
    let adapter = create_adapter(config)?;
    let step = load_step(step)?;

    let cwd = match cwd {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir().context("Failed to determine working directory")?,
    };
    let script = absolute(script, &cwd);

    println!(
        "{} Submitting {} to {}",
        style("→").cyan().bold(),
        style(&step.name).bold(),
        adapter.key()
    );

    let outcome = adapter
        .submit(&step, &script, &cwd)
        .await
        .map_err(|e| anyhow::anyhow!("Invalid step '{}': {e}", step.name))?;

    match outcome {
        SubmitOutcome::Submitted(job) => {
            println!("{} Job ID: {}", style("✓").green().bold(), style(job).cyan());
            Ok(())
        }
        SubmitOutcome::Rejected(failure) => {
            anyhow::bail!("Submission rejected: {failure}")
        }
    }
}

fn absolute(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
