//! Job identifiers and job-list inputs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{SchedError, SchedResult};

/// Scheduler-assigned job identifier.
///
/// Only meaningful for the Flux instance that issued it. Callers persist it
/// themselves and hand it back for polling and cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl JobId {
    /// Create a job ID from its numeric value.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the numeric value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl FromStr for JobId {
    type Err = SchedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(JobId)
            .map_err(|_| SchedError::InvalidJobList(format!("'{s}' is not a job identifier")))
    }
}

/// The set of jobs a status or cancel request applies to.
///
/// A single identifier is promoted to a one-element batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobList {
    /// One job.
    Single(JobId),
    /// Any number of jobs, including none.
    Many(Vec<JobId>),
}

impl JobList {
    /// Flatten into an ordered list of identifiers.
    pub fn into_ids(self) -> Vec<JobId> {
        match self {
            JobList::Single(id) => vec![id],
            JobList::Many(ids) => ids,
        }
    }

    /// Check whether the list names no jobs at all.
    pub fn is_empty(&self) -> bool {
        match self {
            JobList::Single(_) => false,
            JobList::Many(ids) => ids.is_empty(),
        }
    }

    /// Validate an untyped job-list value, as received from JSON or a
    /// workflow engine that does not carry Rust types.
    ///
    /// Accepts `null`, an integer, or an array of integers. Anything else is
    /// rejected with [`SchedError::InvalidJobList`].
    pub fn from_json(value: &serde_json::Value) -> SchedResult<Self> {
        use serde_json::Value;

        match value {
            Value::Null => Ok(JobList::Many(Vec::new())),
            Value::Number(n) => n.as_u64().map(|id| JobList::Single(JobId(id))).ok_or_else(|| {
                SchedError::InvalidJobList(format!("{n} is not a valid job identifier"))
            }),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_u64().map(JobId).ok_or_else(|| {
                        SchedError::InvalidJobList(format!("{item} is not a valid job identifier"))
                    })
                })
                .collect::<SchedResult<Vec<_>>>()
                .map(JobList::Many),
            other => Err(SchedError::InvalidJobList(format!(
                "expected an identifier or a list of identifiers, got {other}"
            ))),
        }
    }
}

impl From<JobId> for JobList {
    fn from(id: JobId) -> Self {
        JobList::Single(id)
    }
}

impl From<u64> for JobList {
    fn from(id: u64) -> Self {
        JobList::Single(JobId(id))
    }
}

impl From<Vec<JobId>> for JobList {
    fn from(ids: Vec<JobId>) -> Self {
        JobList::Many(ids)
    }
}

impl From<&[JobId]> for JobList {
    fn from(ids: &[JobId]) -> Self {
        JobList::Many(ids.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_job_id_parse() {
        assert_eq!("42".parse::<JobId>().unwrap(), JobId(42));
        assert_eq!(" 7 ".parse::<JobId>().unwrap(), JobId(7));
        assert!("job-7".parse::<JobId>().is_err());
        assert_eq!(JobId(42).to_string(), "42");
    }

    #[test]
    fn test_single_is_promoted() {
        assert_eq!(JobList::from(42u64).into_ids(), vec![JobId(42)]);
        assert!(!JobList::from(JobId(1)).is_empty());
        assert!(JobList::from(Vec::new()).is_empty());
    }

    #[test]
    fn test_from_json() {
        assert_eq!(
            JobList::from_json(&json!(42)).unwrap(),
            JobList::Single(JobId(42))
        );
        assert_eq!(
            JobList::from_json(&json!([1, 2])).unwrap().into_ids(),
            vec![JobId(1), JobId(2)]
        );
        assert!(JobList::from_json(&json!([])).unwrap().is_empty());
        assert!(JobList::from_json(&json!(null)).unwrap().is_empty());

        assert!(matches!(
            JobList::from_json(&json!("x")),
            Err(SchedError::InvalidJobList(_))
        ));
        assert!(JobList::from_json(&json!([1, "two"])).is_err());
        assert!(JobList::from_json(&json!(-3)).is_err());
        assert!(JobList::from_json(&json!({"id": 1})).is_err());
    }
}
