//! Normalized job states and translation from Flux's vocabulary.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Scheduler-independent lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    /// Accepted by the scheduler, not yet considered for resources.
    Waiting,
    /// Waiting for or being handed an allocation.
    Pending,
    /// Running.
    Running,
    /// Completed with every task exiting 0.
    Finished,
    /// Completed abnormally.
    Failed,
    /// Cancelled or killed by a signal.
    Cancelled,
    /// Not known to the scheduler, or in a state this adapter does not
    /// recognise.
    Unknown,
}

impl State {
    /// Translate a native Flux state marker.
    ///
    /// Matching is case-sensitive and total: anything unrecognised is
    /// [`State::Unknown`].
    pub fn from_flux(flux_state: &str) -> Self {
        match flux_state {
            "running" => State::Running,
            "pending" | "runrequest" | "allocated" | "starting" => State::Pending,
            "submitted" => State::Waiting,
            "failed" => State::Failed,
            "cancelled" | "killed" => State::Cancelled,
            "complete" => State::Finished,
            _ => State::Unknown,
        }
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Finished | State::Failed | State::Cancelled)
    }

    /// Upper-case name used in reports.
    pub fn name(&self) -> &'static str {
        match self {
            State::Waiting => "WAITING",
            State::Pending => "PENDING",
            State::Running => "RUNNING",
            State::Finished => "FINISHED",
            State::Failed => "FAILED",
            State::Cancelled => "CANCELLED",
            State::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw wait-status word recorded by Flux for a completed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus(pub i64);

impl ExitStatus {
    /// True when the process was terminated by a signal (POSIX
    /// `WIFSIGNALED`).
    pub fn signaled(&self) -> bool {
        let low = self.0 & 0x7f;
        low != 0 && low != 0x7f
    }

    /// Signal number, when terminated by a signal.
    pub fn signal(&self) -> Option<i64> {
        self.signaled().then_some(self.0 & 0x7f)
    }

    /// Exit code, when the process exited normally.
    pub fn code(&self) -> Option<i64> {
        (self.0 & 0x7f == 0).then_some((self.0 >> 8) & 0xff)
    }

    /// Whether every task exited cleanly.
    pub fn success(&self) -> bool {
        self.0 == 0
    }

    /// Refine the `complete` marker using the exit status: a signal means
    /// the job was killed, any other non-zero status means it failed.
    pub fn classify(&self) -> &'static str {
        if self.success() {
            "complete"
        } else if self.signaled() {
            "killed"
        } else {
            "failed"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translation_table() {
        assert_eq!(State::from_flux("running"), State::Running);
        for s in ["pending", "runrequest", "allocated", "starting"] {
            assert_eq!(State::from_flux(s), State::Pending);
        }
        assert_eq!(State::from_flux("submitted"), State::Waiting);
        assert_eq!(State::from_flux("failed"), State::Failed);
        assert_eq!(State::from_flux("cancelled"), State::Cancelled);
        assert_eq!(State::from_flux("killed"), State::Cancelled);
        assert_eq!(State::from_flux("complete"), State::Finished);
        assert_eq!(State::from_flux("unknown"), State::Unknown);
    }

    #[test]
    fn test_translation_is_case_sensitive() {
        assert_eq!(State::from_flux("RUNNING"), State::Unknown);
        assert_eq!(State::from_flux("Complete"), State::Unknown);
        assert_eq!(State::from_flux(""), State::Unknown);
        assert_eq!(State::from_flux(" running"), State::Unknown);
    }

    #[test]
    fn test_terminal_states() {
        assert!(State::Finished.is_terminal());
        assert!(State::Failed.is_terminal());
        assert!(State::Cancelled.is_terminal());
        assert!(!State::Running.is_terminal());
        assert!(!State::Pending.is_terminal());
        assert!(!State::Waiting.is_terminal());
        assert!(!State::Unknown.is_terminal());
    }

    #[test]
    fn test_exit_status() {
        let killed = ExitStatus(9);
        assert!(killed.signaled());
        assert_eq!(killed.signal(), Some(9));
        assert_eq!(killed.code(), None);
        assert_eq!(killed.classify(), "killed");

        let exit_one = ExitStatus(1 << 8);
        assert!(!exit_one.signaled());
        assert_eq!(exit_one.code(), Some(1));
        assert_eq!(exit_one.classify(), "failed");

        let clean = ExitStatus(0);
        assert!(clean.success());
        assert_eq!(clean.code(), Some(0));
        assert_eq!(clean.classify(), "complete");

        // 0x7f in the low bits is a stopped process, not a signal death.
        assert!(!ExitStatus(0x137f).signaled());
    }
}
