//! Status command implementation.
//!
//! Poll the Flux instance for the state of one or more jobs.

use std::path::Path;

use anyhow::Result;
use console::style;

use flux_sched::{JobId, JobStatusCode, State};

use super::common::create_adapter;

/// Execute the status command.
pub async fn execute(config: Option<&Path>, jobs: &[JobId], json: bool) -> Result<()> {
    let adapter = create_adapter(config)?;
    let report = adapter.check_jobs(jobs.to_vec()).await;

    if json {
        let states: serde_json::Map<String, serde_json::Value> = jobs
            .iter()
            .map(|job| {
                let state = report
                    .state(*job)
                    .map_or(serde_json::Value::Null, |s| s.name().into());
                (job.to_string(), state)
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&states)?);
    } else {
        if report.code == JobStatusCode::NoJobs {
            println!("No jobs found.");
            return Ok(());
        }

        println!("  {:<20}  {}", style("JOB ID").bold(), style("STATE").bold());
        for job in jobs {
            let state = match report.state(*job) {
                Some(state) => styled(state),
                None => style("-".to_string()).dim(),
            };
            println!("  {:<20}  {state}", job.to_string());
        }
    }

    if report.code == JobStatusCode::Error {
        anyhow::bail!("Status poll did not complete; some jobs are unresolved");
    }
    Ok(())
}

fn styled(state: State) -> console::StyledObject<String> {
    let name = state.name().to_string();
    match state {
        State::Finished => style(name).green(),
        State::Failed | State::Cancelled => style(name).red(),
        State::Waiting | State::Pending => style(name).yellow(),
        State::Unknown => style(name).dim(),
        State::Running => style(name).cyan(),
    }
}
