//! Synced record queries.

use axum::Json;
use axum::extract::{Query, State};

use jobsync_core::error::AppError;
use jobsync_core::result::AppResult;
use jobsync_core::types::AccountId;
use jobsync_core::types::time::parse_timestamp;
use jobsync_database::repositories::RecordQuery;
use jobsync_entity::account::ConnectorSource;

use crate::dto::request::RecordsQuery;
use crate::dto::response::RecordListResponse;
use crate::error::ApiError;
use crate::state::AppState;

const DEFAULT_LIMIT: u32 = 200;
const MAX_LIMIT: u32 = 1000;

/// GET /records?account_id=&source=&start=&end=&limit=
pub async fn list_records(
    State(state): State<AppState>,
    Query(query): Query<RecordsQuery>,
) -> Result<Json<RecordListResponse>, ApiError> {
    let filter = build_filter(query)?;
    let records = state.records.query(&filter).await?;
    Ok(Json(RecordListResponse { records }))
}

fn build_filter(query: RecordsQuery) -> AppResult<RecordQuery> {
    let source = query
        .source
        .as_deref()
        .map(str::parse::<ConnectorSource>)
        .transpose()?;
    let start = bound("start", query.start.as_deref())?;
    let end = bound("end", query.end.as_deref())?;
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(AppError::validation("start must not be after end"));
        }
    }

    Ok(RecordQuery {
        account_id: query.account_id.map(AccountId::from_string),
        source,
        start,
        end,
        limit: query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
    })
}

/// Parse an optional timestamp bound into epoch seconds.
fn bound(name: &str, value: Option<&str>) -> AppResult<Option<i64>> {
    match value {
        None => Ok(None),
        Some(raw) => parse_timestamp(raw)
            .map(|t| Some(t.timestamp()))
            .ok_or_else(|| AppError::validation(format!("Invalid {name} timestamp: {raw}"))),
    }
}
