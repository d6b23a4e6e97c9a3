//! Health check handler.

use axum::Json;
use axum::extract::State;

use crate::dto::response::HealthResponse;
use crate::state::AppState;

/// GET /health
///
/// Reports `degraded` when the database does not answer.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = match state.db.health_check().await {
        Ok(true) => "ok",
        Ok(false) => "degraded",
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            "degraded"
        }
    };
    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
