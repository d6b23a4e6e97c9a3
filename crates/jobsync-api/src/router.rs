//! Route definitions for the JobSync HTTP API.
//!
//! Everything except `/health` sits behind the backend-token middleware.

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, patch, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::auth::require_token;
use crate::middleware::cors::build_cors_layer;
use crate::state::AppState;

/// Build the complete Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .merge(job_routes())
        .merge(account_routes())
        .merge(record_routes())
        .route("/sessions", post(handlers::sessions::create_session))
        .route("/status", get(handlers::status::status))
        .route("/events", get(handlers::ws::ws_upgrade))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_token,
        ));

    let cors = build_cors_layer(&state.config.server.cors);

    Router::new()
        .merge(protected)
        .route("/health", get(handlers::health::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Job submission and lookup
fn job_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/jobs",
            post(handlers::jobs::submit_job).get(handlers::jobs::list_jobs),
        )
        .route("/jobs/{id}", get(handlers::jobs::get_job))
        .route("/jobs/{id}/events", get(handlers::jobs::job_events))
        .route("/jobs/{id}/cancel", post(handlers::jobs::cancel_job))
}

/// Connector accounts and on-demand sync
fn account_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/accounts",
            post(handlers::accounts::create_account).get(handlers::accounts::list_accounts),
        )
        .route(
            "/accounts/{id}",
            get(handlers::accounts::get_account).delete(handlers::accounts::delete_account),
        )
        .route("/accounts/{id}/sync", post(handlers::accounts::sync_account))
        .route(
            "/accounts/{id}/sub-resources",
            get(handlers::accounts::list_sub_resources),
        )
        .route(
            "/accounts/{id}/sub-resources/{sub_id}",
            patch(handlers::accounts::update_sub_resource),
        )
}

fn record_routes() -> Router<AppState> {
    Router::new().route("/records", get(handlers::records::list_records))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use jobsync_core::config::{AppConfig, WorkerConfig};
    use jobsync_database::DatabasePool;
    use jobsync_realtime::EventBus;
    use jobsync_worker::{JobEngine, JobExecutor, SessionStore};

    use super::*;

    async fn router(token: &str) -> Router {
        let mut config = AppConfig::default();
        config.auth.token = token.to_string();

        let db = Arc::new(DatabasePool::connect_in_memory().await.unwrap());
        jobsync_database::migration::run_migrations(db.pool())
            .await
            .unwrap();
        let bus = Arc::new(EventBus::new(16));
        let engine = JobEngine::new(
            db.pool().clone(),
            Arc::clone(&bus),
            Arc::new(JobExecutor::new()),
            &WorkerConfig::default(),
        );
        let sessions = Arc::new(SessionStore::new(&config.process));
        build_router(AppState::new(Arc::new(config), db, bus, engine, sessions))
    }

    async fn get(router: Router, uri: &str, header: Option<(&str, &str)>) -> StatusCode {
        let mut request = Request::builder().uri(uri);
        if let Some((name, value)) = header {
            request = request.header(name, value);
        }
        router
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_health_is_open() {
        assert_eq!(get(router("t").await, "/health", None).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_token_header_variants() {
        let app = router("secret").await;
        assert_eq!(get(app.clone(), "/status", None).await, StatusCode::UNAUTHORIZED);
        assert_eq!(
            get(app.clone(), "/status", Some(("x-backend-token", "secret"))).await,
            StatusCode::OK
        );
        assert_eq!(
            get(app.clone(), "/status", Some(("authorization", "Bearer secret"))).await,
            StatusCode::OK
        );
        assert_eq!(
            get(app, "/status", Some(("authorization", "Bearer wrong"))).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn test_empty_configured_token_rejects_everything() {
        let app = router("").await;
        assert_eq!(
            get(app, "/jobs", Some(("x-backend-token", ""))).await,
            StatusCode::UNAUTHORIZED
        );
    }
}
