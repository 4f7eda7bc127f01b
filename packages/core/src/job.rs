//! Job domain types for work items in the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reason recorded when a fetched resource exceeds the configured size limit.
pub const FILE_TOO_LARGE: &str = "file_too_large";

/// Unique identifier for a job.
///
/// Assigned from a monotonically increasing sequence at enqueue time, so it
/// doubles as the FIFO tie-breaker.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct JobId(pub i64);

impl JobId {
    /// Raw sequence value.
    pub fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who submitted a job and where the result goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Requester {
    /// Submitting user.
    pub user_id: i64,
    /// Originating chat, also the delivery target.
    pub chat_id: i64,
    /// Message to reply to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<i64>,
}

impl Requester {
    pub fn new(user_id: i64, chat_id: i64) -> Self {
        Self {
            user_id,
            chat_id,
            reply_to: None,
        }
    }

    /// Reply to a specific message when delivering.
    pub fn replying_to(mut self, message_id: i64) -> Self {
        self.reply_to = Some(message_id);
        self
    }
}

/// Current status of a job in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Job is waiting to be claimed.
    #[default]
    Queued,
    /// Job has been claimed by a worker.
    Running,
    /// Job finished successfully.
    Done,
    /// Job finished with an error.
    Error,
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Done)
                | (JobStatus::Running, JobStatus::Error)
        )
    }

    /// Get a simple status string for display and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a claimed job ended, as reported by the worker that ran it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    /// Delivered; `bytes_sent` is the size of the fetched resource.
    Done { bytes_sent: u64 },
    /// Failed with a description or reason code.
    Failed { error: String },
}

impl JobOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        JobOutcome::Failed {
            error: error.into(),
        }
    }

    /// Terminal status this outcome maps to.
    pub fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Done { .. } => JobStatus::Done,
            JobOutcome::Failed { .. } => JobStatus::Error,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Done { .. })
    }

    /// Bytes to record; always zero for failures.
    pub fn bytes_sent(&self) -> u64 {
        match self {
            JobOutcome::Done { bytes_sent } => *bytes_sent,
            JobOutcome::Failed { .. } => 0,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            JobOutcome::Done { .. } => None,
            JobOutcome::Failed { error } => Some(error),
        }
    }
}

/// A job represents a unit of work to be executed by the queue system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique, monotonically increasing identifier.
    pub id: JobId,
    /// Who submitted it.
    pub requester: Requester,
    /// Resource reference to process (a URL).
    pub payload: String,
    /// Current status.
    pub status: JobStatus,
    /// When the job was enqueued.
    pub created_at: DateTime<Utc>,
    /// When a worker claimed the job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Bytes delivered (zero unless done).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_sent: Option<u64>,
    /// Failure description or reason code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    /// Check that the timestamps agree with the status.
    ///
    /// `started_at` is set iff the job left `queued`; `finished_at` is set
    /// iff the job is terminal.
    pub fn check_invariants(&self) -> Result<(), String> {
        let started = self.started_at.is_some();
        let finished = self.finished_at.is_some();
        let expect_started = self.status != JobStatus::Queued;
        let expect_finished = self.status.is_terminal();

        if started != expect_started {
            return Err(format!(
                "job {} is {} but started_at is {}",
                self.id,
                self.status,
                if started { "set" } else { "missing" }
            ));
        }
        if finished != expect_finished {
            return Err(format!(
                "job {} is {} but finished_at is {}",
                self.id,
                self.status,
                if finished { "set" } else { "missing" }
            ));
        }
        Ok(())
    }

    /// Wall time between claim and finish, if both happened.
    pub fn duration_ms(&self) -> Option<u64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds().max(0) as u64),
            _ => None,
        }
    }
}
