//! Reconciliation job state machine
//!
//! A sync job progresses PENDING → RUNNING → {COMPLETED | CANCELLED};
//! a job found still RUNNING at startup (the process died under it) is
//! moved to INTERRUPTED. Terminal states are final.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    /// Created, background task not yet processing
    Pending,
    /// Background task working through entries
    Running,
    /// All entries processed
    Completed,
    /// Cancelled cooperatively at an entry boundary
    Cancelled,
    /// Process restarted while the job was active
    Interrupted,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
            JobState::Completed => "COMPLETED",
            JobState::Cancelled => "CANCELLED",
            JobState::Interrupted => "INTERRUPTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(JobState::Pending),
            "RUNNING" => Some(JobState::Running),
            "COMPLETED" => Some(JobState::Completed),
            "CANCELLED" => Some(JobState::Cancelled),
            "INTERRUPTED" => Some(JobState::Interrupted),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Cancelled | JobState::Interrupted
        )
    }
}

/// Rejected state transition
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid job transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: JobState,
    pub to: JobState,
}

/// One reconciliation run over a user's library
///
/// One non-terminal job per user at a time; terminal rows are retained
/// for history. Counters are persisted after every entry so progress is
/// queryable mid-run and survives a crash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJob {
    pub job_id: Uuid,
    pub user_id: i64,
    pub state: JobState,
    /// Unlinked entries this run will process
    pub total: i64,
    /// Entries processed so far
    pub processed: i64,
    /// Links created by this run
    pub linked: i64,
    /// Entries that produced no auto-link (low confidence, no candidates, error)
    pub failed: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncJob {
    pub fn new(user_id: i64) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4(),
            user_id,
            state: JobState::Pending,
            total: 0,
            processed: 0,
            linked: 0,
            failed: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Transition to a new state, rejecting anything the state machine
    /// does not allow. No transition ever leaves a terminal state.
    pub fn transition_to(&mut self, next: JobState) -> Result<(), InvalidTransition> {
        let allowed = match (self.state, next) {
            (JobState::Pending, JobState::Running) => true,
            (JobState::Pending, JobState::Cancelled) => true,
            (JobState::Pending, JobState::Interrupted) => true,
            (JobState::Running, JobState::Completed) => true,
            (JobState::Running, JobState::Cancelled) => true,
            (JobState::Running, JobState::Interrupted) => true,
            _ => false,
        };

        if !allowed {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_is_pending() {
        let job = SyncJob::new(42);
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.processed, 0);
        assert!(!job.is_terminal());
    }

    #[test]
    fn normal_lifecycle() {
        let mut job = SyncJob::new(42);
        job.transition_to(JobState::Running).unwrap();
        job.transition_to(JobState::Completed).unwrap();
        assert!(job.is_terminal());
    }

    #[test]
    fn cancel_from_pending_and_running() {
        let mut pending = SyncJob::new(1);
        pending.transition_to(JobState::Cancelled).unwrap();
        assert_eq!(pending.state, JobState::Cancelled);

        let mut running = SyncJob::new(2);
        running.transition_to(JobState::Running).unwrap();
        running.transition_to(JobState::Cancelled).unwrap();
        assert_eq!(running.state, JobState::Cancelled);
    }

    #[test]
    fn terminal_states_are_final() {
        let mut job = SyncJob::new(42);
        job.transition_to(JobState::Running).unwrap();
        job.transition_to(JobState::Cancelled).unwrap();

        for next in [
            JobState::Pending,
            JobState::Running,
            JobState::Completed,
            JobState::Interrupted,
        ] {
            assert!(job.transition_to(next).is_err());
            assert_eq!(job.state, JobState::Cancelled);
        }
    }

    #[test]
    fn no_skip_from_pending_to_completed() {
        let mut job = SyncJob::new(42);
        assert!(job.transition_to(JobState::Completed).is_err());
    }

    #[test]
    fn state_round_trips_through_strings() {
        for state in [
            JobState::Pending,
            JobState::Running,
            JobState::Completed,
            JobState::Cancelled,
            JobState::Interrupted,
        ] {
            assert_eq!(JobState::parse(state.as_str()), Some(state));
        }
        assert_eq!(JobState::parse("NOPE"), None);
    }
}
