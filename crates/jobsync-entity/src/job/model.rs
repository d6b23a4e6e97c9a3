//! Job entity model.

use chrono::{DateTime, Utc};
use jobsync_core::types::JobId;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::kind::JobKind;
use super::status::JobStatus;

/// A background job.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Job {
    /// Unique job identifier.
    pub id: JobId,
    /// What the job does.
    pub kind: JobKind,
    /// Current job status.
    pub status: JobStatus,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the job was last updated.
    pub updated_at: DateTime<Utc>,
    /// Advisory progress in `0.0..=1.0`.
    pub progress: f64,
    /// Current step text.
    pub message: Option<String>,
    /// Job input.
    pub payload: serde_json::Value,
    /// Output, set only on success.
    pub result: Option<serde_json::Value>,
    /// `{message, kind, ...}`, set only on failure.
    pub error: Option<serde_json::Value>,
}

impl Job {
    /// Check whether the job has reached a final state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
