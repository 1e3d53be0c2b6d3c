//! Flux Batch-Scheduler Adapter
//!
//! This crate lets a workflow engine run its steps on machines managed by
//! the Flux resource manager. It covers the four things an engine needs from
//! a scheduler:
//!
//! 1. **Scripts**: Render a step into a batch script with a Flux header
//! 2. **Submission**: Send a structured job request over the `job.submit` RPC
//! 3. **Polling**: Resolve job state from the Flux key-value store
//! 4. **Cancellation**: Stop jobs with `flux wreck`, escalating cancel to kill
//!
//! # Variants
//!
//! | Variant | Key | Launcher |
//! |---------|-----|----------|
//! | Plain Flux | `flux` | `flux wreckrun` |
//! | Flux + Spectrum MPI | `flux-spectrum` | `mpirun -hostfile $HOSTF` |
//!
//! # Job States
//!
//! Native Flux states are normalized into [`State`]. A job that finished
//! as `complete` is refined using its highest task exit status, so a job
//! killed by a signal is reported as `CANCELLED` and a non-zero exit as
//! `FAILED`.
//!
//! # Example
//!
//! ```ignore
//! use std::path::Path;
//! use flux_sched::{FluxAdapter, FluxConfig, StepDescription};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = FluxConfig::flux().with_bank("physics").with_queue("pbatch");
//!     let adapter = FluxAdapter::new(config)?;
//!
//!     let step = StepDescription::new("sim", "$(LAUNCHER) ./sim")
//!         .with_nodes(2)
//!         .with_cores_per_task(4)
//!         .with_walltime("01:00:00");
//!
//!     let workspace = Path::new("./ws");
//!     let paths = adapter.write_script(workspace, &step).await?;
//!     let outcome = adapter.submit(&step, &paths.script, workspace).await?;
//!
//!     if let Some(job) = outcome.job_id() {
//!         let report = adapter.check_jobs(job).await;
//!         println!("{job}: {:?}", report.state(job));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Testing
//!
//! [`mock::MockFlux`] and [`mock::MockControl`] simulate a Flux instance in
//! memory and plug into [`FluxAdapter::with_backends`].

pub mod adapter;
pub mod config;
pub mod control;
pub mod environ;
pub mod error;
pub mod handle;
pub mod job;
pub mod jobspec;
pub mod mock;
pub mod script;
pub mod state;
pub mod status;
pub mod step;
pub mod walltime;

// Re-exports
pub use adapter::{FluxAdapter, ScriptPaths};
pub use config::{BatchParameters, FluxConfig, FluxVariant};
pub use control::{ControlTool, ControlVerb, WreckControl};
pub use error::{SchedError, SchedResult};
pub use handle::{Connector, FluxHandle, KvsError, ProcessConnector, ProcessHandle};
pub use job::{JobId, JobList};
pub use jobspec::JobRequest;
pub use state::{ExitStatus, State};
pub use status::{
    CancelCode, JobStatusCode, JobStatusReport, SubmissionCode, SubmitFailure, SubmitOutcome,
};
pub use step::{RunSpec, StepDescription};
