//! Cancel command implementation.

use std::path::Path;

use anyhow::Result;
use console::style;

use flux_sched::{CancelCode, JobId};

use super::common::create_adapter;

/// Execute the cancel command.
pub async fn execute(config: Option<&Path>, jobs: &[JobId]) -> Result<()> {
    let adapter = create_adapter(config)?;

    match adapter.cancel_jobs(jobs).await {
        CancelCode::Ok => {
            println!(
                "{} Stopped {} job(s)",
                style("✓").green().bold(),
                jobs.len()
            );
            Ok(())
        }
        CancelCode::Error => {
            anyhow::bail!("Could not confirm termination of every job; re-run status for details")
        }
    }
}
