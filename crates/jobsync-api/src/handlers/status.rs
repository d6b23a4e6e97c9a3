//! Engine status handler.

use axum::Json;
use axum::extract::State;

use jobsync_worker::EngineStatus;

use crate::state::AppState;

/// GET /status
pub async fn status(State(state): State<AppState>) -> Json<EngineStatus> {
    Json(state.engine.status_snapshot())
}
