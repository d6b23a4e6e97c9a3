//! Connector account handlers.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde_json::json;

use jobsync_core::error::AppError;
use jobsync_core::result::AppResult;
use jobsync_core::types::AccountId;
use jobsync_entity::account::{ConnectorAccount, ConnectorSource, CreateAccount};
use jobsync_entity::job::{JobKind, JobStatus};
use jobsync_entity::sub_resource::SubResourceEntry;

use crate::dto::request::{
    CreateAccountRequest, ListAccountsQuery, ListSubResourcesQuery, SyncAccountRequest,
    UpdateSubResourceRequest,
};
use crate::dto::response::{
    AccountDeleted, AccountListResponse, JobAccepted, SubResourceListResponse,
};
use crate::error::ApiError;
use crate::extractors::ValidatedJson;
use crate::state::AppState;

/// POST /accounts
pub async fn create_account(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CreateAccountRequest>,
) -> Result<(StatusCode, Json<ConnectorAccount>), ApiError> {
    let source: ConnectorSource = req.source.parse()?;
    if !req.settings.is_object() || !req.credentials.is_object() {
        return Err(AppError::validation("settings and credentials must be JSON objects").into());
    }

    let account = state
        .accounts
        .create(&CreateAccount {
            source,
            display_name: req.display_name.trim().to_string(),
            settings: req.settings,
            credentials: req.credentials,
        })
        .await?;

    tracing::info!(
        account_id = %account.account_id,
        source = %account.source,
        "Connector account registered"
    );
    Ok((StatusCode::CREATED, Json(account)))
}

/// GET /accounts?source=
pub async fn list_accounts(
    State(state): State<AppState>,
    Query(query): Query<ListAccountsQuery>,
) -> Result<Json<AccountListResponse>, ApiError> {
    let source = query
        .source
        .as_deref()
        .map(str::parse::<ConnectorSource>)
        .transpose()?;
    let accounts = state.accounts.list(source).await?;
    Ok(Json(AccountListResponse { accounts }))
}

/// GET /accounts/{id}
pub async fn get_account(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConnectorAccount>, ApiError> {
    Ok(Json(find_account(&state, id).await?))
}

/// DELETE /accounts/{id}
pub async fn delete_account(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AccountDeleted>, ApiError> {
    let account = find_account(&state, id).await?;
    let deleted = state.accounts.delete(&account).await?;
    tracing::info!(account_id = %account.account_id, "Connector account deleted");
    Ok(Json(AccountDeleted {
        account_id: account.account_id.to_string(),
        deleted,
    }))
}

/// POST /accounts/{id}/sync
///
/// The body is optional; an empty body means `{"force": false}`.
pub async fn sync_account(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<SyncAccountRequest>>,
) -> Result<(StatusCode, Json<JobAccepted>), ApiError> {
    let account = find_account(&state, id).await?;
    let force = body.map(|Json(req)| req.force).unwrap_or(false);

    let job_id = state
        .engine
        .submit(
            JobKind::for_source(account.source),
            json!({ "account_id": account.account_id, "force": force }),
        )
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(JobAccepted {
            job_id,
            status: JobStatus::Queued,
        }),
    ))
}

/// GET /accounts/{id}/sub-resources
///
/// Lists what the last sync discovered; empty before the first sync.
pub async fn list_sub_resources(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ListSubResourcesQuery>,
) -> Result<Json<SubResourceListResponse>, ApiError> {
    let account = find_account(&state, id).await?;
    let sub_resources = state
        .sub_resources
        .list_for_account(&account.account_id, query.selected_only)
        .await?;
    Ok(Json(SubResourceListResponse { sub_resources }))
}

/// PATCH /accounts/{id}/sub-resources/{sub_id}
pub async fn update_sub_resource(
    State(state): State<AppState>,
    Path((id, sub_id)): Path<(String, String)>,
    ValidatedJson(req): ValidatedJson<UpdateSubResourceRequest>,
) -> Result<Json<SubResourceEntry>, ApiError> {
    let account = find_account(&state, id).await?;
    let entry = state
        .sub_resources
        .set_selected(&account.account_id, &sub_id, req.selected)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Sub-resource {sub_id} not found")))?;

    tracing::info!(
        account_id = %account.account_id,
        sub_resource = %entry.sub_id,
        selected = entry.selected,
        "Sub-resource selection updated"
    );
    Ok(Json(entry))
}

async fn find_account(state: &AppState, id: String) -> AppResult<ConnectorAccount> {
    let account_id = AccountId::from_string(id);
    state
        .accounts
        .find_by_id(&account_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Account {account_id} not found")))
}
