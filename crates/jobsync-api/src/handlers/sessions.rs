//! Process session handlers.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use crate::dto::response::SessionCreated;
use crate::state::AppState;

/// POST /sessions
pub async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionCreated>) {
    let session_id = state.sessions.create();
    (StatusCode::CREATED, Json(SessionCreated { session_id }))
}
