//! Job submission, lookup, and cancellation handlers.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;

use jobsync_core::types::JobId;
use jobsync_entity::job::{Job, JobKind, JobStatus};

use crate::dto::request::{ListJobsQuery, SubmitJobRequest};
use crate::dto::response::{JobAccepted, JobEventsResponse, JobListResponse};
use crate::error::ApiError;
use crate::extractors::ValidatedJson;
use crate::state::AppState;

/// POST /jobs
pub async fn submit_job(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<SubmitJobRequest>,
) -> Result<(StatusCode, Json<JobAccepted>), ApiError> {
    let kind: JobKind = req.kind.parse()?;
    let job_id = state.engine.submit(kind, req.payload).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(JobAccepted {
            job_id,
            status: JobStatus::Queued,
        }),
    ))
}

/// GET /jobs?limit=
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<JobListResponse>, ApiError> {
    let jobs = state.engine.list(query.limit).await?;
    Ok(Json(JobListResponse { jobs }))
}

/// GET /jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    let job = state.engine.get(&JobId::from_string(id)).await?;
    Ok(Json(job))
}

/// GET /jobs/{id}/events
pub async fn job_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobEventsResponse>, ApiError> {
    let events = state.engine.events(&JobId::from_string(id)).await?;
    Ok(Json(JobEventsResponse { events }))
}

/// POST /jobs/{id}/cancel
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobAccepted>, ApiError> {
    let job_id = JobId::from_string(id);
    let status = state.engine.cancel(&job_id).await?;
    Ok(Json(JobAccepted { job_id, status }))
}
