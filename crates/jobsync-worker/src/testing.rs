//! Shared fixtures for the crate's unit tests.

use std::sync::Arc;

use serde_json::Value;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

use jobsync_core::types::JobId;
use jobsync_database::DatabasePool;
use jobsync_database::migration::run_migrations;
use jobsync_database::repositories::{JobEventRepository, JobRepository};
use jobsync_entity::job::JobKind;
use jobsync_realtime::EventBus;

use crate::context::JobContext;

/// A migrated in-memory database.
pub(crate) async fn test_pool() -> SqlitePool {
    let db = DatabasePool::connect_in_memory().await.unwrap();
    run_migrations(db.pool()).await.unwrap();
    db.pool().clone()
}

/// Persist a job, claim it, and wrap it in a handler context.
pub(crate) async fn running_context(
    pool: &SqlitePool,
    kind: JobKind,
    payload: Value,
    bus: Arc<EventBus>,
) -> JobContext {
    let jobs = JobRepository::new(pool.clone());
    let id = JobId::new();
    jobs.create(&id, kind, &payload).await.unwrap();
    assert!(jobs.claim(&id).await.unwrap());
    let job = jobs.find_by_id(&id).await.unwrap().unwrap();

    JobContext::new(
        job,
        CancellationToken::new(),
        jobs,
        JobEventRepository::new(pool.clone()),
        bus,
    )
}
