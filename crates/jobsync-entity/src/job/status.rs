//! Job status enumeration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a background job.
///
/// `Queued -> Running -> {Succeeded | Failed}`, or `Queued -> Canceled`.
/// Terminal statuses never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Persisted and waiting in the queue.
    Queued,
    /// Claimed by a worker.
    Running,
    /// The handler finished without error.
    Succeeded,
    /// The handler failed or faulted.
    Failed,
    /// Canceled before a worker claimed it.
    Canceled,
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }

    /// Return the status as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
