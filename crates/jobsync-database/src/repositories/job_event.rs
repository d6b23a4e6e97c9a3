//! Job event log repository.

use chrono::Utc;
use sqlx::SqlitePool;

use jobsync_core::error::{AppError, ErrorKind};
use jobsync_core::result::AppResult;
use jobsync_core::types::JobId;
use jobsync_entity::job::{EventLevel, JobEvent};

/// Append-only access to `job_events`.
#[derive(Debug, Clone)]
pub struct JobEventRepository {
    pool: SqlitePool,
}

impl JobEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append an event to a job's log.
    pub async fn append(
        &self,
        job_id: &JobId,
        level: EventLevel,
        message: &str,
        meta: Option<&serde_json::Value>,
    ) -> AppResult<JobEvent> {
        sqlx::query_as::<_, JobEvent>(
            "INSERT INTO job_events (job_id, level, message, meta, created_at) \
             VALUES (?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(job_id)
        .bind(level)
        .bind(message)
        .bind(meta)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to append job event", e))
    }

    /// All events of a job in insertion order.
    pub async fn list_for_job(&self, job_id: &JobId) -> AppResult<Vec<JobEvent>> {
        sqlx::query_as::<_, JobEvent>("SELECT * FROM job_events WHERE job_id = ? ORDER BY id ASC")
            .bind(job_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list job events", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::DatabasePool;
    use crate::migration::run_migrations;
    use crate::repositories::JobRepository;
    use jobsync_entity::job::JobKind;
    use serde_json::json;

    #[tokio::test]
    async fn test_events_keep_insertion_order() {
        let db = DatabasePool::connect_in_memory().await.unwrap();
        run_migrations(db.pool()).await.unwrap();
        let jobs = JobRepository::new(db.pool().clone());
        let events = JobEventRepository::new(db.pool().clone());

        let id = JobId::new();
        jobs.create(&id, JobKind::Noop, &json!({})).await.unwrap();
        events.append(&id, EventLevel::Info, "queued", None).await.unwrap();
        events
            .append(&id, EventLevel::Warn, "cancel requested", Some(&json!({"status": "running"})))
            .await
            .unwrap();

        let listed = events.list_for_job(&id).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].message, "queued");
        assert_eq!(listed[1].level, EventLevel::Warn);
        assert_eq!(listed[1].meta, Some(json!({"status": "running"})));
        assert!(listed[0].id < listed[1].id);
    }
}
