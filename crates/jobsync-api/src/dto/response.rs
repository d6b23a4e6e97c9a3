//! Response DTOs for API endpoints.

use serde::{Deserialize, Serialize};

use jobsync_core::types::{JobId, SessionId};
use jobsync_entity::account::ConnectorAccount;
use jobsync_entity::job::{Job, JobEvent, JobStatus};
use jobsync_entity::record::SyncedRecord;
use jobsync_entity::sub_resource::SubResourceEntry;

/// Returned when a job is submitted or cancelled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAccepted {
    pub job_id: JobId,
    pub status: JobStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<Job>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobEventsResponse {
    pub events: Vec<JobEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountListResponse {
    pub accounts: Vec<ConnectorAccount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountDeleted {
    pub account_id: String,
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubResourceListResponse {
    pub sub_resources: Vec<SubResourceEntry>,
}

/// POST /sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCreated {
    pub session_id: SessionId,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordListResponse {
    pub records: Vec<SyncedRecord>,
}

/// GET /health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
