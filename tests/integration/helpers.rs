//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use jobsync_api::{AppState, build_router};
use jobsync_connector::AdapterRegistry;
use jobsync_core::config::{AppConfig, SyncConfig};
use jobsync_core::types::JobId;
use jobsync_database::DatabasePool;
use jobsync_entity::job::Job;
use jobsync_realtime::EventBus;
use jobsync_worker::jobs::{ConnectorSyncHandler, NoopHandler};
use jobsync_worker::sync::{LeaseTable, SyncEngine};
use jobsync_worker::{JobEngine, JobExecutor, SessionStore};

pub const TOKEN: &str = "test-token";

/// Test application context
pub struct TestApp {
    /// The Axum router for making test requests
    pub router: Router,
    pub db: Arc<DatabasePool>,
    pub bus: Arc<EventBus>,
    pub engine: Arc<JobEngine>,
}

impl TestApp {
    /// An app with a running worker pool.
    pub async fn new() -> Self {
        Self::build(true).await
    }

    /// An app whose workers never start, so submitted jobs stay queued.
    pub async fn without_workers() -> Self {
        Self::build(false).await
    }

    async fn build(start_workers: bool) -> Self {
        let mut config = AppConfig::default();
        config.auth.token = TOKEN.to_string();

        let db = Arc::new(
            DatabasePool::connect_in_memory()
                .await
                .expect("Failed to open test database"),
        );
        jobsync_database::migration::run_migrations(db.pool())
            .await
            .expect("Failed to run migrations");

        let bus = Arc::new(EventBus::new(256));

        // No adapters: connector jobs fail fast instead of calling out.
        let sync = Arc::new(SyncEngine::new(
            AdapterRegistry::new(),
            db.pool().clone(),
            LeaseTable::new(Duration::from_secs(60)),
            SyncConfig::default(),
        ));
        let mut executor = JobExecutor::new();
        executor.register(Arc::new(NoopHandler));
        for handler in ConnectorSyncHandler::all(&sync) {
            executor.register(handler);
        }

        let engine = JobEngine::new(
            db.pool().clone(),
            Arc::clone(&bus),
            Arc::new(executor),
            &config.worker,
        );
        if start_workers {
            engine.start().await;
        }

        let sessions = Arc::new(SessionStore::new(&config.process));
        let state = AppState::new(
            Arc::new(config),
            Arc::clone(&db),
            Arc::clone(&bus),
            Arc::clone(&engine),
            sessions,
        );

        Self {
            router: build_router(state),
            db,
            bus,
            engine,
        }
    }

    /// Serve the router on an ephemeral local port.
    pub async fn spawn_server(&self) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("No local addr");
        let router = self.router.clone();
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("Test server failed");
        });
        addr
    }

    /// Request with the backend token attached.
    pub async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        self.send(method, path, body, Some(TOKEN)).await
    }

    /// Make an HTTP request to the test app
    pub async fn send(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> TestResponse {
        let mut req = Request::builder().method(method).uri(path);
        if body.is_some() {
            req = req.header("Content-Type", "application/json");
        }
        if let Some(token) = token {
            req = req.header("X-Backend-Token", token);
        }

        let body_str = body
            .map(|b| serde_json::to_string(&b).expect("Failed to serialize body"))
            .unwrap_or_default();
        let req = req
            .body(Body::from(body_str))
            .expect("Failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(req)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("Failed to read body");
        let body: Value = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);

        TestResponse { status, body }
    }

    /// Poll a job until it reaches a terminal status.
    pub async fn wait_for_terminal(&self, id: &str) -> Job {
        let id = JobId::from_string(id);
        for _ in 0..200 {
            let job = self.engine.get(&id).await.expect("job should exist");
            if job.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("job {id} did not finish in time");
    }
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Parsed JSON body
    pub body: Value,
}
