//! Job requests sent to `job.submit` and the replies that come back.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::config::FluxConfig;
use crate::error::{SchedError, SchedResult};
use crate::job::JobId;
use crate::step::StepDescription;

/// RPC topic for job submission.
pub const SUBMIT_TOPIC: &str = "job.submit";

/// RPC topic resolving job identifiers to KVS paths.
pub const KVSPATH_TOPIC: &str = "job.kvspath";

/// Lifecycle marker of an accepted submission.
pub const SUBMITTED_STATE: &str = "submitted";

/// Per-task layout of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLayout {
    pub nnodes: u32,
    pub ntasks: u32,
    #[serde(rename = "cores-per-task")]
    pub cores_per_task: u32,
    #[serde(rename = "tasks-per-node")]
    pub tasks_per_node: u32,
}

/// Structured job document for `job.submit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub nnodes: u32,
    /// One task per node.
    pub ntasks: u32,
    /// Always `cores_per_task * nnodes`.
    pub ncores: u32,
    pub ngpus: u32,
    pub environ: BTreeMap<String, String>,
    /// Open-ended scheduler options.
    pub options: BTreeMap<String, serde_json::Value>,
    pub opts: TaskLayout,
    pub cwd: PathBuf,
    /// Walltime in seconds.
    pub walltime: u64,
    pub cmdline: Vec<String>,
}

impl JobRequest {
    /// Build the request for a step whose script lives at `script`.
    ///
    /// Fails with a configuration error, before anything is sent, when the
    /// walltime is malformed, the computed core count is zero, or an
    /// explicit process count disagrees with the computed core count.
    pub fn build(
        step: &StepDescription,
        config: &FluxConfig,
        script: &Path,
        cwd: &Path,
        environ: BTreeMap<String, String>,
    ) -> SchedResult<Self> {
        let walltime = step.walltime_seconds()?;
        let nodes = step.nodes();
        let cores_per_task = step.cores_per_task();
        let ngpus = step.gpus();

        let ncores = cores_per_task.checked_mul(nodes).ok_or_else(|| {
            SchedError::InvalidResources(format!(
                "core count overflows (nodes = {nodes}, cores per task = {cores_per_task})"
            ))
        })?;

        if let Some(procs) = step.run.procs {
            if procs > 0 && procs != ncores {
                let msg = format!(
                    "calculated ncores (nodes * cores per task) = {ncores} -- procs = {procs}"
                );
                error!(step = %step.name, "{msg}");
                return Err(SchedError::InvalidResources(msg));
            }
        }

        if ncores == 0 {
            let msg = format!("invalid number of cores specified (ncores = {ncores})");
            error!(step = %step.name, "{msg}");
            return Err(SchedError::InvalidResources(msg));
        }

        let script = script.display().to_string();
        let cmdline = if nodes > 1 {
            vec![
                config.flux_program.display().to_string(),
                "broker".to_string(),
                script,
            ]
        } else {
            vec![script]
        };

        let mut options = BTreeMap::new();
        options.insert("stdio-delay-commit".to_string(), serde_json::json!(1));

        Ok(Self {
            nnodes: nodes,
            ntasks: nodes,
            ncores,
            ngpus,
            environ,
            options,
            opts: TaskLayout {
                nnodes: nodes,
                ntasks: nodes,
                cores_per_task,
                tasks_per_node: 1,
            },
            cwd: cwd.to_path_buf(),
            walltime,
            cmdline,
        })
    }
}

/// Reply to `job.submit`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResponse {
    #[serde(default)]
    pub errnum: Option<i64>,
    #[serde(default)]
    pub state: Option<String>,
    /// Raw identifier. Error replies may carry a negative sentinel.
    #[serde(default)]
    pub jobid: Option<i64>,
}

impl JobResponse {
    /// The assigned identifier, if the reply carries a valid one.
    pub fn job_id(&self) -> Option<JobId> {
        self.jobid
            .and_then(|id| u64::try_from(id).ok())
            .map(JobId)
    }
}

/// Request for `job.kvspath`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvsPathRequest {
    pub ids: Vec<JobId>,
}

/// Reply to `job.kvspath`, one path per requested identifier, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvsPathReply {
    #[serde(default)]
    pub paths: Vec<String>,
}
