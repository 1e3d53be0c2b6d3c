//! Outcome codes returned to the workflow engine.

use rustc_hash::FxHashMap;

use crate::job::JobId;
use crate::state::State;

/// Overall result of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionCode {
    Ok,
    Error,
}

/// Overall result of a status poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatusCode {
    Ok,
    Error,
    /// The scheduler resolved none of the requested jobs.
    NoJobs,
}

/// Overall result of a cancellation batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCode {
    Ok,
    Error,
}

/// Why the scheduler did not accept a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitFailure {
    /// The handle could not be established or the call did not go through.
    Channel(String),
    /// The call went through but no reply came back.
    NoReply,
    /// The reply carried an error number.
    ErrorCode(i64),
    /// The reply did not report the job as submitted.
    UnexpectedState(Option<String>),
    /// The reply reported success but carried no job identifier.
    MissingJobId,
}

impl std::fmt::Display for SubmitFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmitFailure::Channel(msg) => write!(f, "channel failure: {msg}"),
            SubmitFailure::NoReply => write!(f, "no reply from job.submit"),
            SubmitFailure::ErrorCode(errnum) => write!(f, "job creation failed (errnum {errnum})"),
            SubmitFailure::UnexpectedState(Some(state)) => {
                write!(f, "job creation failed (state '{state}')")
            }
            SubmitFailure::UnexpectedState(None) => write!(f, "job creation failed (no state)"),
            SubmitFailure::MissingJobId => write!(f, "submission reply carried no job id"),
        }
    }
}

/// Result of a submission attempt that got past local validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Accepted, with the scheduler-assigned identifier.
    Submitted(JobId),
    /// Not accepted.
    Rejected(SubmitFailure),
}

impl SubmitOutcome {
    pub fn code(&self) -> SubmissionCode {
        match self {
            SubmitOutcome::Submitted(_) => SubmissionCode::Ok,
            SubmitOutcome::Rejected(_) => SubmissionCode::Error,
        }
    }

    pub fn job_id(&self) -> Option<JobId> {
        match self {
            SubmitOutcome::Submitted(id) => Some(*id),
            SubmitOutcome::Rejected(_) => None,
        }
    }
}

/// Result of polling a batch of jobs.
///
/// Every requested identifier has an entry. `None` means the poll stopped
/// before reaching that job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatusReport {
    pub code: JobStatusCode,
    pub states: FxHashMap<JobId, Option<State>>,
}

impl JobStatusReport {
    /// A report with the given code and every job unresolved.
    pub fn unresolved(code: JobStatusCode, jobs: &[JobId]) -> Self {
        Self {
            code,
            states: jobs.iter().map(|id| (*id, None)).collect(),
        }
    }

    /// An OK report covering no jobs.
    pub fn empty() -> Self {
        Self {
            code: JobStatusCode::Ok,
            states: FxHashMap::default(),
        }
    }

    /// State of one job, if it was resolved.
    pub fn state(&self, job: JobId) -> Option<State> {
        self.states.get(&job).copied().flatten()
    }
}
