//! Request DTOs for API endpoints.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// POST /jobs
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitJobRequest {
    /// Job kind, e.g. `noop` or `connector.jira.sync`.
    #[validate(length(min = 1, max = 64))]
    pub kind: String,
    #[serde(default = "empty_object")]
    pub payload: serde_json::Value,
}

/// POST /accounts/{id}/sync
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct SyncAccountRequest {
    /// Ignore stored cursors and fetch the full window.
    #[serde(default)]
    pub force: bool,
}

/// POST /accounts
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateAccountRequest {
    #[validate(length(min = 1, max = 32))]
    pub source: String,
    #[validate(length(min = 1, max = 255))]
    pub display_name: String,
    #[serde(default = "empty_object")]
    pub settings: serde_json::Value,
    #[serde(default = "empty_object")]
    pub credentials: serde_json::Value,
}

/// PATCH /accounts/{id}/sub-resources/{sub}
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateSubResourceRequest {
    pub selected: bool,
}

/// GET /accounts/{id}/sub-resources?selected_only=
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListSubResourcesQuery {
    #[serde(default)]
    pub selected_only: bool,
}

/// GET /jobs?limit=
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListJobsQuery {
    pub limit: Option<u32>,
}

/// GET /accounts?source=
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListAccountsQuery {
    pub source: Option<String>,
}

/// GET /records
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordsQuery {
    pub account_id: Option<String>,
    pub source: Option<String>,
    /// RFC 3339 lower bound.
    pub start: Option<String>,
    /// RFC 3339 upper bound.
    pub end: Option<String>,
    pub limit: Option<u32>,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}
