//! Flux adapter for script generation, submission, polling and cancellation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, error, info, warn};

use crate::config::FluxConfig;
use crate::control::{ControlTool, ControlVerb, WreckControl};
use crate::environ;
use crate::error::{SchedError, SchedResult};
use crate::handle::{Connector, FluxHandle, KvsError, ProcessConnector};
use crate::job::{JobId, JobList};
use crate::jobspec::{
    JobRequest, JobResponse, KvsPathReply, KvsPathRequest, KVSPATH_TOPIC, SUBMITTED_STATE,
    SUBMIT_TOPIC,
};
use crate::script;
use crate::state::{ExitStatus, State};
use crate::status::{CancelCode, JobStatusCode, JobStatusReport, SubmitFailure, SubmitOutcome};
use crate::step::StepDescription;

/// Scripts written for a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptPaths {
    /// Whether the step has to go through the scheduler.
    pub to_be_scheduled: bool,
    /// Script running the step's command.
    pub script: PathBuf,
    /// Script running the step's restart command, if it has one.
    pub restart: Option<PathBuf>,
}

/// Adapter for the Flux scheduler.
///
/// The scheduler handle is opened on first use and reused for the lifetime
/// of the adapter. Calls on the handle are serialized.
pub struct FluxAdapter {
    config: FluxConfig,
    connector: Arc<dyn Connector>,
    control: Arc<dyn ControlTool>,
    handle: OnceCell<Mutex<Box<dyn FluxHandle>>>,
}

impl FluxAdapter {
    /// Create an adapter driving the local `flux` command-line tool.
    pub fn new(config: FluxConfig) -> SchedResult<Self> {
        let connector = Arc::new(ProcessConnector::new(&config));
        let control = Arc::new(WreckControl::new(&config));
        Self::with_backends(config, connector, control)
    }

    /// Create an adapter with explicit scheduler and control backends.
    pub fn with_backends(
        config: FluxConfig,
        connector: Arc<dyn Connector>,
        control: Arc<dyn ControlTool>,
    ) -> SchedResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            connector,
            control,
            handle: OnceCell::new(),
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &FluxConfig {
        &self.config
    }

    /// Registry key of this adapter's variant.
    pub fn key(&self) -> &'static str {
        self.config.variant.key()
    }

    /// Whether the scheduler handle has been opened.
    pub fn is_connected(&self) -> bool {
        self.handle.initialized()
    }

    async fn handle(&self) -> SchedResult<&Mutex<Box<dyn FluxHandle>>> {
        self.handle
            .get_or_try_init(|| async {
                debug!(variant = self.key(), "Initializing a new Flux handle");
                self.connector.connect().await.map(Mutex::new)
            })
            .await
    }

    /// Write the scripts for `step` into `workspace`.
    ///
    /// Both scripts are rendered before anything is written, so a malformed
    /// walltime leaves the workspace untouched.
    pub async fn write_script(
        &self,
        workspace: &Path,
        step: &StepDescription,
    ) -> SchedResult<ScriptPaths> {
        step.validate()?;
        let command = script::scheduler_command(step, &self.config);
        let scheduled = command.to_be_scheduled;

        let primary = script::render(step, &self.config, &command.cmd, scheduled)?;
        let restart = command
            .restart
            .as_deref()
            .map(|body| script::render(step, &self.config, body, scheduled))
            .transpose()?;

        let script_path = workspace.join(script::script_name(step));
        write_executable(&script_path, &primary).await?;

        let restart_path = match restart {
            Some(body) => {
                let path = workspace.join(script::restart_script_name(step));
                write_executable(&path, &body).await?;
                Some(path)
            }
            None => None,
        };

        debug!(
            step = %step.name,
            scheduled,
            script = %script_path.display(),
            "Wrote step script"
        );

        Ok(ScriptPaths {
            to_be_scheduled: scheduled,
            script: script_path,
            restart: restart_path,
        })
    }

    /// Submit `script` for `step`, shipping the filtered process environment.
    pub async fn submit(
        &self,
        step: &StepDescription,
        script: &Path,
        cwd: &Path,
    ) -> SchedResult<SubmitOutcome> {
        let environ = environ::process_environment(&self.config.env_prefix_filter);
        self.submit_with_environment(step, script, cwd, environ).await
    }

    /// Submit `script` for `step` with an explicit job environment.
    ///
    /// Resource and walltime problems are returned as `Err` before the
    /// scheduler is contacted. Everything that goes wrong afterwards is a
    /// [`SubmitOutcome::Rejected`].
    pub async fn submit_with_environment(
        &self,
        step: &StepDescription,
        script: &Path,
        cwd: &Path,
        environ: BTreeMap<String, String>,
    ) -> SchedResult<SubmitOutcome> {
        let request = JobRequest::build(step, &self.config, script, cwd, environ)?;
        debug!(step = %step.name, cmdline = ?request.cmdline, "Job request built");
        let payload = serde_json::to_value(&request)?;

        let handle = match self.handle().await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(step = %step.name, "Unable to open Flux handle: {e}");
                return Ok(SubmitOutcome::Rejected(SubmitFailure::Channel(e.to_string())));
            }
        };

        let reply = handle.lock().await.rpc(SUBMIT_TOPIC, payload).await;
        let reply = match reply {
            Ok(Some(reply)) => reply,
            Ok(None) => {
                warn!(step = %step.name, "RPC response invalid");
                return Ok(SubmitOutcome::Rejected(SubmitFailure::NoReply));
            }
            Err(e) => {
                warn!(step = %step.name, "Submission RPC failed: {e}");
                return Ok(SubmitOutcome::Rejected(SubmitFailure::Channel(e.to_string())));
            }
        };

        let response: JobResponse = match serde_json::from_value(reply) {
            Ok(response) => response,
            Err(e) => {
                warn!(step = %step.name, "Malformed submission reply: {e}");
                return Ok(SubmitOutcome::Rejected(SubmitFailure::Channel(format!(
                    "malformed reply: {e}"
                ))));
            }
        };

        if let Some(errnum) = response.errnum {
            warn!(step = %step.name, errnum, "Job creation failed with error code {errnum}");
            return Ok(SubmitOutcome::Rejected(SubmitFailure::ErrorCode(errnum)));
        }

        if response.state.as_deref() != Some(SUBMITTED_STATE) {
            warn!(step = %step.name, state = ?response.state, "Job creation failed");
            return Ok(SubmitOutcome::Rejected(SubmitFailure::UnexpectedState(
                response.state,
            )));
        }

        match response.job_id() {
            Some(job) => {
                info!(step = %step.name, %job, "Submission returned status OK");
                Ok(SubmitOutcome::Submitted(job))
            }
            None => {
                warn!(step = %step.name, "Submission accepted without a job identifier");
                Ok(SubmitOutcome::Rejected(SubmitFailure::MissingJobId))
            }
        }
    }

    /// Query the state of a batch of jobs with one path-resolution call.
    ///
    /// A job whose KVS entry is missing is reported as [`State::Unknown`]
    /// and polling continues. A KVS I/O fault stops the batch and returns
    /// what was collected so far with [`JobStatusCode::Error`].
    pub async fn check_jobs(&self, jobs: impl Into<JobList>) -> JobStatusReport {
        let jobs = jobs.into().into_ids();
        debug!(count = jobs.len(), "Checking jobs");
        if jobs.is_empty() {
            debug!("Empty job list specified");
            return JobStatusReport::empty();
        }

        let handle = match self.handle().await {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Unable to open Flux handle: {e}");
                return JobStatusReport::unresolved(JobStatusCode::Error, &jobs);
            }
        };
        let mut handle = handle.lock().await;

        let paths = match resolve_paths(handle.as_mut(), &jobs).await {
            Ok(paths) => paths,
            Err(e) => {
                warn!("Unable to resolve job paths: {e}");
                return JobStatusReport::unresolved(JobStatusCode::Error, &jobs);
            }
        };
        if paths.is_empty() {
            debug!("No paths returned for {} job(s)", jobs.len());
            return JobStatusReport::unresolved(JobStatusCode::NoJobs, &jobs);
        }

        let mut report = JobStatusReport::unresolved(JobStatusCode::Ok, &jobs);
        for (i, job) in jobs.iter().enumerate() {
            let Some(path) = paths.get(i) else {
                warn!(%job, "No KVS path returned; setting state to UNKNOWN");
                report.states.insert(*job, Some(State::Unknown));
                continue;
            };

            debug!(%job, %path, "Checking job");
            match read_native_state(handle.as_mut(), path).await {
                Ok(native) => {
                    let state = State::from_flux(&native);
                    debug!(%job, native = %native, %state, "Translated job state");
                    report.states.insert(*job, Some(state));
                }
                Err(KvsError::NotFound(key)) => {
                    warn!(%job, %key, "Job not found in KVS; setting state to UNKNOWN");
                    report.states.insert(*job, Some(State::Unknown));
                }
                Err(e @ KvsError::Io { .. }) => {
                    error!(%job, %path, "Error reading job state: {e}");
                    report.code = JobStatusCode::Error;
                    return report;
                }
            }
        }

        report
    }

    /// Stop every job in `jobs`.
    ///
    /// Each job gets a cancel, then a kill, then a status check that accepts
    /// a job which already reached a terminal state. A job that passes none
    /// of these makes the batch result [`CancelCode::Error`], but the
    /// remaining jobs are still processed.
    pub async fn cancel_jobs(&self, jobs: &[JobId]) -> CancelCode {
        if jobs.is_empty() {
            return CancelCode::Ok;
        }

        let mut code = CancelCode::Ok;
        for &job in jobs {
            if !self.terminate(job).await {
                warn!(%job, "Unable to cancel job; unexpected behavior encountered");
                code = CancelCode::Error;
            }
        }
        code
    }

    async fn terminate(&self, job: JobId) -> bool {
        debug!(%job, "Cancelling job");
        if self.control.invoke(ControlVerb::Cancel, job).await {
            return true;
        }

        debug!(%job, "'flux wreck cancel' failed, trying kill");
        if self.control.invoke(ControlVerb::Kill, job).await {
            return true;
        }

        debug!(%job, "'flux wreck kill' failed, checking status");
        let report = self.check_jobs(job).await;
        report.state(job).is_some_and(|state| state.is_terminal())
    }
}

async fn resolve_paths(handle: &mut dyn FluxHandle, jobs: &[JobId]) -> SchedResult<Vec<String>> {
    let payload = serde_json::to_value(KvsPathRequest { ids: jobs.to_vec() })?;
    let reply = handle
        .rpc(KVSPATH_TOPIC, payload)
        .await?
        .ok_or_else(|| SchedError::RpcError {
            topic: KVSPATH_TOPIC.to_string(),
            message: "no reply".to_string(),
        })?;
    let reply: KvsPathReply = serde_json::from_value(reply)?;
    Ok(reply.paths)
}

/// Read the native state of the job at `path`, refining `complete` with the
/// job's highest exit status.
async fn read_native_state(handle: &mut dyn FluxHandle, path: &str) -> Result<String, KvsError> {
    let state = handle.kvs_get(&format!("{path}.state")).await?;
    let state = match state {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    };
    if state != "complete" {
        return Ok(state);
    }

    let max = handle.kvs_get(&format!("{path}.exit_status.max")).await?;
    let Some(raw) = max.as_i64() else {
        warn!(%path, value = %max, "Exit status is not an integer");
        return Ok("unknown".to_string());
    };

    let status = ExitStatus(raw);
    debug!(%path, raw, signaled = status.signaled(), "State 'complete' found");
    Ok(status.classify().to_string())
}

async fn write_executable(path: &Path, contents: &str) -> SchedResult<()> {
    fs::write(path, contents).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await?;
    }
    Ok(())
}
