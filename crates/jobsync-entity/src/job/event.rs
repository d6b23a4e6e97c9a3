//! Append-only diagnostic events attached to a job.

use std::fmt;

use chrono::{DateTime, Utc};
use jobsync_core::types::JobId;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Severity of a job event or log frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

impl EventLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entry in a job's event log.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobEvent {
    /// Autoincrement id; insertion order.
    pub id: i64,
    /// Owning job.
    pub job_id: JobId,
    pub level: EventLevel,
    pub message: String,
    /// Optional structured context.
    pub meta: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
