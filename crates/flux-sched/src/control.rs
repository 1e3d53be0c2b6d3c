//! External control tool used to stop jobs.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::warn;

use crate::config::FluxConfig;
use crate::error::{SchedError, SchedResult};
use crate::job::JobId;

/// Termination actions, mildest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlVerb {
    Cancel,
    Kill,
}

impl ControlVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlVerb::Cancel => "cancel",
            ControlVerb::Kill => "kill",
        }
    }
}

/// Issues termination actions for a job.
#[async_trait]
pub trait ControlTool: Send + Sync {
    /// Returns true when the tool accepted the action (exit status 0).
    /// Failures to run the tool at all are reported as `false`.
    async fn invoke(&self, verb: ControlVerb, job: JobId) -> bool;
}

/// Runs `flux wreck <verb> <jobid>` with output discarded.
#[derive(Debug, Clone)]
pub struct WreckControl {
    program: PathBuf,
    timeout: Duration,
}

impl WreckControl {
    pub fn new(config: &FluxConfig) -> Self {
        Self {
            program: config.flux_program.clone(),
            timeout: config.command_timeout(),
        }
    }
}

impl WreckControl {
    async fn run(&self, verb: ControlVerb, job: JobId) -> SchedResult<bool> {
        let id = job.to_string();
        let command = || format!("{} wreck {} {id}", self.program.display(), verb.as_str());

        let status = tokio::time::timeout(
            self.timeout,
            Command::new(&self.program)
                .args(["wreck", verb.as_str(), &id])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .status(),
        )
        .await
        .map_err(|_| {
            SchedError::Timeout(format!(
                "'{}' did not finish within {}s",
                command(),
                self.timeout.as_secs()
            ))
        })?
        .map_err(|e| SchedError::CommandError {
            command: command(),
            message: e.to_string(),
        })?;

        Ok(status.success())
    }
}

#[async_trait]
impl ControlTool for WreckControl {
    async fn invoke(&self, verb: ControlVerb, job: JobId) -> bool {
        match self.run(verb, job).await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(%job, verb = verb.as_str(), "{e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbs() {
        assert_eq!(ControlVerb::Cancel.as_str(), "cancel");
        assert_eq!(ControlVerb::Kill.as_str(), "kill");
    }

    #[tokio::test]
    async fn test_missing_program_rejects() {
        let config = FluxConfig::default().with_flux_program("/nonexistent/flux-binary");
        let control = WreckControl::new(&config);
        assert!(matches!(
            control.run(ControlVerb::Cancel, JobId(1)).await,
            Err(SchedError::CommandError { .. })
        ));
        assert!(!control.invoke(ControlVerb::Cancel, JobId(1)).await);
    }
}
