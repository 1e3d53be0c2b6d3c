//! Step descriptions handed to the adapter by the workflow engine.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{SchedError, SchedResult};
use crate::walltime;

/// Resource request and commands of a workflow step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSpec {
    /// Number of compute nodes.
    #[serde(default)]
    pub nodes: Option<u32>,

    /// Total number of processes.
    #[serde(default)]
    pub procs: Option<u32>,

    /// Cores assigned to each task.
    #[serde(default, rename = "cores per task", alias = "cores_per_task")]
    pub cores_per_task: Option<u32>,

    /// GPUs requested.
    #[serde(default)]
    pub gpus: Option<u32>,

    /// Wall-clock limit as `HH:MM:SS`.
    #[serde(default)]
    pub walltime: Option<String>,

    /// Primary command text.
    pub cmd: String,

    /// Command to run when the step is restarted.
    #[serde(default)]
    pub restart: Option<String>,
}

/// A workflow step as seen by the adapter (read-only).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDescription {
    /// Step name, used for script file names and the job name.
    pub name: String,

    /// Human description.
    #[serde(default)]
    pub description: String,

    /// Resource request and commands.
    pub run: RunSpec,
}

impl StepDescription {
    /// Create a step with a name and a command and no resource request.
    pub fn new(name: impl Into<String>, cmd: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            run: RunSpec {
                cmd: cmd.into(),
                ..Default::default()
            },
        }
    }

    /// Load a step description from a YAML document.
    pub fn from_yaml_str(yaml: &str) -> SchedResult<Self> {
        let step: StepDescription = serde_yaml_ng::from_str(yaml)?;
        step.validate()?;
        Ok(step)
    }

    /// Load a step description from a YAML file.
    pub fn from_yaml_file(path: &Path) -> SchedResult<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_nodes(mut self, nodes: u32) -> Self {
        self.run.nodes = Some(nodes);
        self
    }

    pub fn with_procs(mut self, procs: u32) -> Self {
        self.run.procs = Some(procs);
        self
    }

    pub fn with_cores_per_task(mut self, cores: u32) -> Self {
        self.run.cores_per_task = Some(cores);
        self
    }

    pub fn with_gpus(mut self, gpus: u32) -> Self {
        self.run.gpus = Some(gpus);
        self
    }

    pub fn with_walltime(mut self, walltime: impl Into<String>) -> Self {
        self.run.walltime = Some(walltime.into());
        self
    }

    pub fn with_restart(mut self, restart: impl Into<String>) -> Self {
        self.run.restart = Some(restart.into());
        self
    }

    /// Reject steps that cannot be scheduled at all.
    pub fn validate(&self) -> SchedResult<()> {
        if self.name.trim().is_empty() {
            return Err(SchedError::ConfigError("step name is empty".into()));
        }
        if self.run.nodes == Some(0) {
            return Err(SchedError::InvalidResources(format!(
                "step '{}' requests 0 nodes",
                self.name
            )));
        }
        Ok(())
    }

    /// Node count, zero when the step does not request nodes.
    pub fn nodes(&self) -> u32 {
        self.run.nodes.unwrap_or(0)
    }

    /// Cores per task. Missing and zero both mean the default of 1.
    pub fn cores_per_task(&self) -> u32 {
        match self.run.cores_per_task {
            Some(cores) if cores > 0 => cores,
            _ => 1,
        }
    }

    /// GPU count. Missing and zero both mean no GPUs.
    pub fn gpus(&self) -> u32 {
        self.run.gpus.unwrap_or(0)
    }

    /// Whether the step asks for nodes or processes and therefore has to go
    /// through the scheduler rather than running inline.
    pub fn requests_resources(&self) -> bool {
        self.run.nodes.is_some_and(|n| n > 0) || self.run.procs.is_some_and(|p| p > 0)
    }

    /// Walltime in whole seconds.
    pub fn walltime_seconds(&self) -> SchedResult<u64> {
        let raw = self
            .run
            .walltime
            .as_deref()
            .ok_or_else(|| SchedError::InvalidWalltime(String::new()))?;
        walltime::to_seconds(raw)
    }
}
