//! Lifecycle Integration Tests
//!
//! Drive a step through script generation, submission, polling and
//! cancellation against the in-memory Flux instance.

use std::collections::BTreeMap;
use std::sync::Arc;

use flux_sched::mock::{MockControl, MockFlux};
use flux_sched::{
    CancelCode, ControlVerb, FluxAdapter, FluxConfig, JobId, JobList, JobStatusCode, SchedError,
    State, StepDescription, SubmissionCode,
};
use serde_json::json;

fn adapter_with(config: FluxConfig, flux: &MockFlux, control: &MockControl) -> FluxAdapter {
    FluxAdapter::with_backends(config, Arc::new(flux.clone()), Arc::new(control.clone()))
        .expect("valid configuration")
}

fn simulation_step() -> StepDescription {
    StepDescription::from_yaml_str(
        r#"
name: lulesh run
description: |
  Run LULESH
  at scale
run:
  nodes: 4
  cores per task: 2
  walltime: "00:10:00"
  cmd: $(LAUNCHER)[4n, 8p] ./lulesh -s 50
  restart: $(LAUNCHER)[4n, 8p] ./lulesh -s 50 -r
"#,
    )
    .expect("valid step")
}

#[tokio::test]
async fn test_full_lifecycle() {
    let workspace = tempfile::tempdir().unwrap();
    let flux = MockFlux::new();
    let control = MockControl::linked_to(&flux);
    let adapter = adapter_with(FluxConfig::flux().with_bank("physics"), &flux, &control);
    let step = simulation_step();

    let paths = adapter.write_script(workspace.path(), &step).await.unwrap();
    assert!(paths.to_be_scheduled);
    assert!(paths.restart.is_some());

    let script = std::fs::read_to_string(&paths.script).unwrap();
    assert!(script.contains("#INFO (job-name) lulesh_run\n"));
    assert!(script.contains("#INFO (comment) Run LULESH at scale\n"));
    assert!(script.contains("#INFO (bank) physics\n"));
    assert!(script.ends_with("\n\nflux wreckrun -n 8 -N 4 ./lulesh -s 50\n"));

    let mut environ = BTreeMap::new();
    environ.insert("PATH".to_string(), "/usr/bin".to_string());
    let outcome = adapter
        .submit_with_environment(&step, &paths.script, workspace.path(), environ)
        .await
        .unwrap();
    assert_eq!(outcome.code(), SubmissionCode::Ok);
    let job = outcome.job_id().unwrap();

    let request = &flux.submitted()[0];
    assert_eq!(request["nnodes"], 4);
    assert_eq!(request["ntasks"], 4);
    assert_eq!(request["ncores"], 8);
    assert_eq!(request["ngpus"], 0);
    assert_eq!(request["walltime"], 600);
    assert_eq!(request["options"], json!({"stdio-delay-commit": 1}));
    assert_eq!(request["opts"]["cores-per-task"], 2);
    assert_eq!(request["opts"]["tasks-per-node"], 1);
    assert_eq!(request["environ"], json!({"PATH": "/usr/bin"}));
    assert_eq!(request["cmdline"][1], "broker");

    let report = adapter.check_jobs(job).await;
    assert_eq!(report.code, JobStatusCode::Ok);
    assert_eq!(report.state(job), Some(State::Waiting));

    flux.set_state(job, "running");
    assert_eq!(adapter.check_jobs(job).await.state(job), Some(State::Running));

    assert_eq!(adapter.cancel_jobs(&[job]).await, CancelCode::Ok);
    assert_eq!(adapter.check_jobs(job).await.state(job), Some(State::Cancelled));
    assert_eq!(control.calls(), vec![(ControlVerb::Cancel, job)]);

    assert_eq!(flux.connect_count(), 1);
}

#[tokio::test]
async fn test_single_node_submission_runs_script_directly() {
    let flux = MockFlux::new();
    let adapter = adapter_with(FluxConfig::flux(), &flux, &MockControl::new());
    let step = StepDescription::new("post", "./post")
        .with_nodes(1)
        .with_walltime("00:05:00");

    let script = std::path::Path::new("/ws/post.flux.sh");
    adapter
        .submit_with_environment(&step, script, std::path::Path::new("/ws"), BTreeMap::new())
        .await
        .unwrap();

    assert_eq!(flux.submitted()[0]["cmdline"], json!(["/ws/post.flux.sh"]));
}

#[tokio::test]
async fn test_inline_step_has_no_header() {
    let workspace = tempfile::tempdir().unwrap();
    let adapter = adapter_with(
        FluxConfig::spectrum("/opt/ibm/spectrum_mpi/bin/mpirun"),
        &MockFlux::new(),
        &MockControl::new(),
    );
    let step = StepDescription::new("collect", "$(LAUNCHER) ./collect");

    let paths = adapter.write_script(workspace.path(), &step).await.unwrap();

    assert!(!paths.to_be_scheduled);
    assert_eq!(paths.restart, None);
    let script = std::fs::read_to_string(&paths.script).unwrap();
    assert_eq!(script, "#!/bin/bash\n\n$(LAUNCHER) ./collect\n");
}

#[tokio::test]
async fn test_spectrum_multi_node_discovers_hosts() {
    let workspace = tempfile::tempdir().unwrap();
    let adapter = adapter_with(
        FluxConfig::spectrum("/opt/ibm/spectrum_mpi/bin/mpirun"),
        &MockFlux::new(),
        &MockControl::new(),
    );
    let step = simulation_step();

    let paths = adapter.write_script(workspace.path(), &step).await.unwrap();
    let script = std::fs::read_to_string(&paths.script).unwrap();

    assert!(script.contains("#SBATCH -N 4\n"));
    assert!(script.contains("instance-nodes > $HOSTF_SINGLE"));
    assert!(!script.contains("echo localhost"));
    assert!(script.contains(
        "env -u FLUX_JOB_ID -u PMI_FD -u PMI_RANK -u PMI_SIZE \
         /opt/ibm/spectrum_mpi/bin/mpirun -hostfile $HOSTF -n 8 ./lulesh -s 50"
    ));
}

#[tokio::test]
async fn test_exit_status_classification() {
    let flux = MockFlux::new();
    // Signal 9.
    flux.add_job(JobId(1), "complete");
    flux.set_exit_status(JobId(1), 9);
    // Normal exit with code 1.
    flux.add_job(JobId(2), "complete");
    flux.set_exit_status(JobId(2), 256);
    flux.add_job(JobId(3), "complete");
    flux.set_exit_status(JobId(3), 0);
    let adapter = adapter_with(FluxConfig::flux(), &flux, &MockControl::new());

    let report = adapter.check_jobs(vec![JobId(1), JobId(2), JobId(3)]).await;

    assert_eq!(report.code, JobStatusCode::Ok);
    assert_eq!(report.state(JobId(1)), Some(State::Cancelled));
    assert_eq!(report.state(JobId(2)), Some(State::Failed));
    assert_eq!(report.state(JobId(3)), Some(State::Finished));
}

#[tokio::test]
async fn test_job_list_inputs() {
    let flux = MockFlux::new();
    flux.add_job(JobId(42), "running");
    let adapter = adapter_with(FluxConfig::flux(), &flux, &MockControl::new());

    let empty = JobList::from_json(&json!([])).unwrap();
    let report = adapter.check_jobs(empty).await;
    assert_eq!(report.code, JobStatusCode::Ok);
    assert!(report.states.is_empty());

    let single = JobList::from_json(&json!(42)).unwrap();
    let report = adapter.check_jobs(single).await;
    assert_eq!(report.states.len(), 1);
    assert_eq!(report.state(JobId(42)), Some(State::Running));

    assert!(matches!(
        JobList::from_json(&json!("x")),
        Err(SchedError::InvalidJobList(_))
    ));
}

#[tokio::test]
async fn test_cancel_reconciles_finished_job() {
    let flux = MockFlux::new();
    flux.add_job(JobId(7), "complete");
    flux.set_exit_status(JobId(7), 0);
    let control = MockControl::new();
    control.reject(ControlVerb::Cancel, JobId(7));
    control.reject(ControlVerb::Kill, JobId(7));
    let adapter = adapter_with(FluxConfig::flux(), &flux, &control);

    assert_eq!(adapter.cancel_jobs(&[JobId(7)]).await, CancelCode::Ok);
    assert_eq!(
        control.calls(),
        vec![(ControlVerb::Cancel, JobId(7)), (ControlVerb::Kill, JobId(7))]
    );
}

#[tokio::test]
async fn test_cancel_failure_does_not_stop_batch() {
    let flux = MockFlux::new();
    flux.add_job(JobId(1), "running");
    flux.add_job(JobId(2), "running");
    let control = MockControl::linked_to(&flux);
    control.reject(ControlVerb::Cancel, JobId(1));
    control.reject(ControlVerb::Kill, JobId(1));
    let adapter = adapter_with(FluxConfig::flux(), &flux, &control);

    assert_eq!(adapter.cancel_jobs(&[JobId(1), JobId(2)]).await, CancelCode::Error);
    assert_eq!(flux.state(JobId(1)).as_deref(), Some("running"));
    assert_eq!(flux.state(JobId(2)).as_deref(), Some("cancelled"));
}

#[tokio::test]
async fn test_storage_fault_returns_partial_results() {
    let flux = MockFlux::new();
    flux.add_job(JobId(1), "pending");
    flux.add_job(JobId(2), "running");
    flux.add_job(JobId(3), "running");
    flux.fail_reads(JobId(2));
    let adapter = adapter_with(FluxConfig::flux(), &flux, &MockControl::new());

    let report = adapter.check_jobs(vec![JobId(1), JobId(2), JobId(3)]).await;

    assert_eq!(report.code, JobStatusCode::Error);
    assert_eq!(report.state(JobId(1)), Some(State::Pending));
    assert_eq!(report.states.get(&JobId(2)), Some(&None));
    assert_eq!(report.states.get(&JobId(3)), Some(&None));
}

#[tokio::test]
async fn test_adapters_do_not_share_handles() {
    let flux_a = MockFlux::new();
    let flux_b = MockFlux::new();
    let a = adapter_with(FluxConfig::flux(), &flux_a, &MockControl::new());
    let b = adapter_with(FluxConfig::spectrum("mpirun"), &flux_b, &MockControl::new());

    let step = StepDescription::new("s", "true")
        .with_nodes(1)
        .with_walltime("00:01:00");
    let script = std::path::Path::new("/ws/s.flux.sh");
    let cwd = std::path::Path::new("/ws");
    for _ in 0..3 {
        a.submit_with_environment(&step, script, cwd, BTreeMap::new())
            .await
            .unwrap();
    }
    b.submit_with_environment(&step, script, cwd, BTreeMap::new())
        .await
        .unwrap();

    assert_eq!(flux_a.connect_count(), 1);
    assert_eq!(flux_b.connect_count(), 1);
    assert_eq!(flux_a.submitted().len(), 3);
    assert_eq!(flux_b.submitted().len(), 1);
    assert_eq!(a.key(), "flux");
    assert_eq!(b.key(), "flux-spectrum");
}
