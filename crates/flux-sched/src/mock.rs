//! In-memory Flux instance for tests and dry runs.
//!
//! [`MockFlux`] answers `job.submit` and `job.kvspath` and serves job state
//! from a map laid out like the real KVS. [`MockControl`] stands in for
//! `flux wreck`. Both are cheap to clone; clones share state, so a test can
//! keep one copy for assertions while the adapter owns the other.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{json, Value};
use tracing::debug;

use crate::control::{ControlTool, ControlVerb};
use crate::error::{SchedError, SchedResult};
use crate::handle::{Connector, FluxHandle, KvsError};
use crate::job::JobId;
use crate::jobspec::{KvsPathRequest, KVSPATH_TOPIC, SUBMITTED_STATE, SUBMIT_TOPIC};

/// KVS directory under which the mock publishes jobs.
const KVS_ROOT: &str = "lwj.0.0";

/// First identifier handed out by the mock.
const FIRST_JOB_ID: u64 = 1000;

#[derive(Debug, Default, Clone)]
struct MockJob {
    state: String,
    exit_status: Option<i64>,
}

#[derive(Debug)]
struct FluxState {
    jobs: FxHashMap<JobId, MockJob>,
    next_id: u64,
    connects: usize,
    fail_connect: bool,
    no_paths: bool,
    io_faults: FxHashSet<JobId>,
    submit_reply: Option<Option<Value>>,
    rpc_calls: Vec<(String, Value)>,
}

impl Default for FluxState {
    fn default() -> Self {
        Self {
            jobs: FxHashMap::default(),
            next_id: FIRST_JOB_ID,
            connects: 0,
            fail_connect: false,
            no_paths: false,
            io_faults: FxHashSet::default(),
            submit_reply: None,
            rpc_calls: Vec::new(),
        }
    }
}

/// A simulated Flux instance.
#[derive(Debug, Clone, Default)]
pub struct MockFlux {
    inner: Arc<Mutex<FluxState>>,
}

impl MockFlux {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FluxState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a job in the given native state.
    pub fn add_job(&self, job: JobId, state: &str) {
        self.lock().jobs.insert(
            job,
            MockJob {
                state: state.to_string(),
                exit_status: None,
            },
        );
    }

    /// Move a job to a new native state, registering it if needed.
    pub fn set_state(&self, job: JobId, state: &str) {
        self.lock().jobs.entry(job).or_default().state = state.to_string();
    }

    /// Record the highest wait status of a job's tasks.
    pub fn set_exit_status(&self, job: JobId, status: i64) {
        self.lock().jobs.entry(job).or_default().exit_status = Some(status);
    }

    /// Make every KVS read under `job` fail with an I/O fault.
    pub fn fail_reads(&self, job: JobId) {
        self.lock().io_faults.insert(job);
    }

    /// Make the next and every later connect attempt fail.
    pub fn fail_connect(&self) {
        self.lock().fail_connect = true;
    }

    /// Answer `job.kvspath` with an empty path list.
    pub fn resolve_no_paths(&self) {
        self.lock().no_paths = true;
    }

    /// Override the reply to `job.submit`. `None` simulates a call with no
    /// reply. The override stays until replaced.
    pub fn reply_to_submit(&self, reply: Option<Value>) {
        self.lock().submit_reply = Some(reply);
    }

    /// Native state of a job, if it is known.
    pub fn state(&self, job: JobId) -> Option<String> {
        self.lock().jobs.get(&job).map(|j| j.state.clone())
    }

    /// Number of handles opened against this instance.
    pub fn connect_count(&self) -> usize {
        self.lock().connects
    }

    /// Every RPC received, in order.
    pub fn rpc_calls(&self) -> Vec<(String, Value)> {
        self.lock().rpc_calls.clone()
    }

    /// Payloads of every `job.submit` received, in order.
    pub fn submitted(&self) -> Vec<Value> {
        self.lock()
            .rpc_calls
            .iter()
            .filter(|(topic, _)| topic == SUBMIT_TOPIC)
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

#[async_trait]
impl Connector for MockFlux {
    async fn connect(&self) -> SchedResult<Box<dyn FluxHandle>> {
        let mut state = self.lock();
        if state.fail_connect {
            return Err(SchedError::ConnectError(
                "mock Flux instance refused the connection".to_string(),
            ));
        }
        state.connects += 1;
        debug!(connects = state.connects, "Mock Flux handle opened");
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl FluxHandle for MockFlux {
    async fn rpc(&mut self, topic: &str, payload: Value) -> SchedResult<Option<Value>> {
        let mut state = self.lock();
        state.rpc_calls.push((topic.to_string(), payload.clone()));

        match topic {
            SUBMIT_TOPIC => {
                if let Some(reply) = state.submit_reply.clone() {
                    return Ok(reply);
                }
                let job = JobId(state.next_id);
                state.next_id += 1;
                state.jobs.insert(
                    job,
                    MockJob {
                        state: SUBMITTED_STATE.to_string(),
                        exit_status: None,
                    },
                );
                Ok(Some(json!({ "state": SUBMITTED_STATE, "jobid": job })))
            }
            KVSPATH_TOPIC => {
                let request: KvsPathRequest = serde_json::from_value(payload)?;
                let paths: Vec<String> = if state.no_paths {
                    Vec::new()
                } else {
                    request
                        .ids
                        .iter()
                        .map(|id| format!("{KVS_ROOT}.{id}"))
                        .collect()
                };
                Ok(Some(json!({ "paths": paths })))
            }
            other => Err(SchedError::RpcError {
                topic: other.to_string(),
                message: "unknown service".to_string(),
            }),
        }
    }

    async fn kvs_get(&mut self, key: &str) -> Result<Value, KvsError> {
        let not_found = || KvsError::NotFound(key.to_string());

        let (job, field) = key
            .strip_prefix(KVS_ROOT)
            .and_then(|rest| rest.strip_prefix('.'))
            .and_then(|rest| rest.split_once('.'))
            .ok_or_else(not_found)?;
        let job: JobId = job.parse().map_err(|_| not_found())?;

        let state = self.lock();
        if state.io_faults.contains(&job) {
            return Err(KvsError::Io {
                key: key.to_string(),
                message: "simulated read fault".to_string(),
            });
        }

        let entry = state.jobs.get(&job).ok_or_else(not_found)?;
        match field {
            "state" => Ok(Value::String(entry.state.clone())),
            "exit_status.max" => entry.exit_status.map(Value::from).ok_or_else(not_found),
            _ => Err(not_found()),
        }
    }
}

#[derive(Debug, Default)]
struct ControlState {
    reject_all: bool,
    rejected: FxHashSet<(ControlVerb, JobId)>,
    calls: Vec<(ControlVerb, JobId)>,
    linked: Option<MockFlux>,
}

/// A simulated `flux wreck`.
///
/// Accepts every action unless told otherwise. When linked to a
/// [`MockFlux`], an accepted action moves the job to `cancelled` or
/// `killed` there.
#[derive(Debug, Clone, Default)]
pub struct MockControl {
    inner: Arc<Mutex<ControlState>>,
}

impl MockControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// A control tool that rejects every action.
    pub fn rejecting() -> Self {
        let control = Self::default();
        control.lock().reject_all = true;
        control
    }

    /// Apply accepted actions to `flux`.
    pub fn linked_to(flux: &MockFlux) -> Self {
        let control = Self::default();
        control.lock().linked = Some(flux.clone());
        control
    }

    fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reject `verb` for `job`.
    pub fn reject(&self, verb: ControlVerb, job: JobId) {
        self.lock().rejected.insert((verb, job));
    }

    /// Every action requested, in order.
    pub fn calls(&self) -> Vec<(ControlVerb, JobId)> {
        self.lock().calls.clone()
    }
}

#[async_trait]
impl ControlTool for MockControl {
    async fn invoke(&self, verb: ControlVerb, job: JobId) -> bool {
        let linked = {
            let mut state = self.lock();
            state.calls.push((verb, job));
            if state.reject_all || state.rejected.contains(&(verb, job)) {
                return false;
            }
            state.linked.clone()
        };

        if let Some(flux) = linked {
            let native = match verb {
                ControlVerb::Cancel => "cancelled",
                ControlVerb::Kill => "killed",
            };
            flux.set_state(job, native);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_submit_assigns_sequential_ids() {
        let flux = MockFlux::new();
        let mut handle = flux.connect().await.unwrap();

        let first = handle.rpc(SUBMIT_TOPIC, json!({})).await.unwrap().unwrap();
        let second = handle.rpc(SUBMIT_TOPIC, json!({})).await.unwrap().unwrap();

        assert_eq!(first["jobid"], 1000);
        assert_eq!(second["jobid"], 1001);
        assert_eq!(flux.state(JobId(1001)).as_deref(), Some("submitted"));
        assert_eq!(flux.submitted().len(), 2);
    }

    #[tokio::test]
    async fn test_kvs_layout() {
        let flux = MockFlux::new();
        flux.add_job(JobId(4), "complete");
        flux.set_exit_status(JobId(4), 0);
        let mut handle = flux.connect().await.unwrap();

        let reply = handle
            .rpc(KVSPATH_TOPIC, json!({"ids": [4, 5]}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply["paths"], json!(["lwj.0.0.4", "lwj.0.0.5"]));

        assert_eq!(handle.kvs_get("lwj.0.0.4.state").await.unwrap(), json!("complete"));
        assert_eq!(handle.kvs_get("lwj.0.0.4.exit_status.max").await.unwrap(), json!(0));
        assert!(matches!(
            handle.kvs_get("lwj.0.0.5.state").await,
            Err(KvsError::NotFound(_))
        ));
        assert!(matches!(handle.kvs_get("garbage").await, Err(KvsError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_linked_control_updates_state() {
        let flux = MockFlux::new();
        flux.add_job(JobId(1), "running");
        let control = MockControl::linked_to(&flux);
        control.reject(ControlVerb::Cancel, JobId(1));

        assert!(!control.invoke(ControlVerb::Cancel, JobId(1)).await);
        assert_eq!(flux.state(JobId(1)).as_deref(), Some("running"));

        assert!(control.invoke(ControlVerb::Kill, JobId(1)).await);
        assert_eq!(flux.state(JobId(1)).as_deref(), Some("killed"));
    }
}
