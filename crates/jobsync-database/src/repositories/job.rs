//! Job repository implementation.
//!
//! Every status change is a compare-and-set on the current status, so a
//! cancel and a claim racing on the same queued job cannot both win.

use chrono::Utc;
use sqlx::SqlitePool;

use jobsync_core::error::{AppError, ErrorKind};
use jobsync_core::result::AppResult;
use jobsync_core::types::JobId;
use jobsync_entity::job::{Job, JobKind};

/// Repository for job persistence and status transitions.
#[derive(Debug, Clone)]
pub struct JobRepository {
    pool: SqlitePool,
}

impl JobRepository {
    /// Create a new job repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist a new `queued` job.
    pub async fn create(
        &self,
        id: &JobId,
        kind: JobKind,
        payload: &serde_json::Value,
    ) -> AppResult<Job> {
        let now = Utc::now();
        sqlx::query_as::<_, Job>(
            "INSERT INTO jobs (id, kind, status, created_at, updated_at, progress, payload) \
             VALUES (?, ?, 'queued', ?, ?, 0, ?) RETURNING *",
        )
        .bind(id)
        .bind(kind)
        .bind(now)
        .bind(now)
        .bind(payload)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to create job", e))
    }

    /// Find a job by ID.
    pub async fn find_by_id(&self, id: &JobId) -> AppResult<Option<Job>> {
        sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find job", e))
    }

    /// List the most recent jobs, newest first.
    pub async fn list_recent(&self, limit: u32) -> AppResult<Vec<Job>> {
        sqlx::query_as::<_, Job>("SELECT * FROM jobs ORDER BY created_at DESC, rowid DESC LIMIT ?")
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list jobs", e))
    }

    /// `queued -> running`. Returns `false` if the job is not queued.
    pub async fn claim(&self, id: &JobId) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'running', updated_at = ? WHERE id = ? AND status = 'queued'",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to claim job", e))?;
        Ok(result.rows_affected() == 1)
    }

    /// `queued -> canceled`. Returns `false` if the job is not queued.
    pub async fn cancel_if_queued(&self, id: &JobId) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'canceled', message = 'canceled', updated_at = ? \
             WHERE id = ? AND status = 'queued'",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to cancel job", e))?;
        Ok(result.rows_affected() == 1)
    }

    /// Record progress on a running job.
    pub async fn update_progress(
        &self,
        id: &JobId,
        progress: f64,
        message: Option<&str>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET progress = ?, message = COALESCE(?, message), updated_at = ? \
             WHERE id = ? AND status = 'running'",
        )
        .bind(progress.clamp(0.0, 1.0))
        .bind(message)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to update job progress", e))?;
        Ok(result.rows_affected() == 1)
    }

    /// `running -> succeeded` with a result.
    pub async fn complete(&self, id: &JobId, result: &serde_json::Value) -> AppResult<bool> {
        let outcome = sqlx::query(
            "UPDATE jobs SET status = 'succeeded', progress = 1.0, message = 'completed', \
             result = ?, updated_at = ? WHERE id = ? AND status = 'running'",
        )
        .bind(result)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to complete job", e))?;
        Ok(outcome.rows_affected() == 1)
    }

    /// `running -> failed` with an error object.
    pub async fn fail(&self, id: &JobId, error: &serde_json::Value) -> AppResult<bool> {
        let message = error.get("message").and_then(|m| m.as_str());
        let outcome = sqlx::query(
            "UPDATE jobs SET status = 'failed', message = ?, error = ?, updated_at = ? \
             WHERE id = ? AND status = 'running'",
        )
        .bind(message)
        .bind(error)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to mark job as failed", e)
        })?;
        Ok(outcome.rows_affected() == 1)
    }

    /// IDs of jobs in `running`, oldest first.
    pub async fn find_running_ids(&self) -> AppResult<Vec<JobId>> {
        self.ids_with_status("running").await
    }

    /// IDs of jobs in `queued`, oldest first.
    pub async fn find_queued_ids(&self) -> AppResult<Vec<JobId>> {
        self.ids_with_status("queued").await
    }

    async fn ids_with_status(&self, status: &str) -> AppResult<Vec<JobId>> {
        sqlx::query_scalar::<_, JobId>(
            "SELECT id FROM jobs WHERE status = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list job ids", e))
    }
}
