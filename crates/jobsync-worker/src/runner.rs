//! Worker loop: dequeues job ids, claims them, and runs their handlers.

use std::any::Any;
use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use jobsync_core::error::AppError;
use jobsync_core::result::AppResult;
use jobsync_core::types::JobId;
use jobsync_entity::job::{EventLevel, JobStatus};
use jobsync_realtime::BusEvent;

use crate::context::JobContext;
use crate::engine::JobEngine;
use crate::executor::JobExecutionError;

/// One long-lived worker in the pool.
#[derive(Debug)]
pub struct WorkerRunner {
    id: usize,
    engine: Arc<JobEngine>,
}

impl WorkerRunner {
    /// Create a worker bound to an engine.
    pub fn new(id: usize, engine: Arc<JobEngine>) -> Self {
        Self { id, engine }
    }

    /// Serve the queue until the engine shuts down.
    pub async fn run(self) {
        info!(worker_id = self.id, "Worker ready");

        loop {
            let next = {
                let mut receiver = self.engine.receiver.lock().await;
                tokio::select! {
                    _ = self.engine.shutdown.cancelled() => None,
                    id = receiver.recv() => id,
                }
            };

            let Some(job_id) = next else {
                break;
            };

            self.engine.active.insert(job_id.clone());
            if let Err(e) = self.process(&job_id).await {
                error!(worker_id = self.id, job_id = %job_id, error = %e, "Failed to process job");
            }
            self.engine.active.remove(&job_id);
        }

        info!(worker_id = self.id, "Worker stopped");
    }

    async fn process(&self, job_id: &JobId) -> AppResult<()> {
        let engine = &self.engine;

        match engine.jobs.claim(job_id).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(worker_id = self.id, job_id = %job_id, "Job is no longer queued, skipping");
                return Ok(());
            }
            Err(e) => {
                // The row is still queued; hand the id back instead of stranding it.
                warn!(
                    worker_id = self.id,
                    job_id = %job_id,
                    error = %e,
                    "Failed to claim job, re-queueing"
                );
                engine.requeue_later(job_id.clone());
                return Ok(());
            }
        }
        let job = match engine.jobs.find_by_id(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => return Ok(()),
            Err(e) => return self.fail(job_id, &JobExecutionError::Internal(e)).await,
        };

        if let Err(e) = engine
            .events
            .append(job_id, EventLevel::Info, "job started", None)
            .await
        {
            warn!(
                worker_id = self.id,
                job_id = %job_id,
                error = %e,
                "Failed to record job started event"
            );
        }
        engine.bus.broadcast(&BusEvent::JobStatus {
            job_id: job_id.clone(),
            status: JobStatus::Running,
        });

        let ctx = JobContext::new(
            job,
            engine.shutdown.child_token(),
            engine.jobs.clone(),
            engine.events.clone(),
            Arc::clone(&engine.bus),
        );
        let executor = Arc::clone(&engine.executor);

        // A panicking handler only takes down its own task.
        let outcome = match tokio::spawn(async move { executor.execute(&ctx).await }).await {
            Ok(outcome) => outcome,
            Err(join_err) if join_err.is_panic() => Err(JobExecutionError::Internal(
                AppError::internal(format!(
                    "handler panicked: {}",
                    panic_message(join_err.into_panic())
                )),
            )),
            Err(_) => Err(JobExecutionError::Interrupted("interrupted by shutdown".into())),
        };

        let outcome = match outcome {
            Err(_) if engine.shutdown.is_cancelled() => {
                Err(JobExecutionError::Interrupted("interrupted by shutdown".into()))
            }
            other => other,
        };

        match outcome {
            Ok(result) => self.succeed(job_id, result).await,
            Err(err) => self.fail(job_id, &err).await,
        }
    }

    async fn succeed(&self, job_id: &JobId, result: Value) -> AppResult<()> {
        let engine = &self.engine;
        if engine.jobs.complete(job_id, &result).await? {
            engine.events.append(job_id, EventLevel::Info, "job completed", None).await?;
            engine.bus.broadcast(&BusEvent::JobStatus {
                job_id: job_id.clone(),
                status: JobStatus::Succeeded,
            });
            info!(worker_id = self.id, job_id = %job_id, "Job succeeded");
        }
        Ok(())
    }

    async fn fail(&self, job_id: &JobId, err: &JobExecutionError) -> AppResult<()> {
        let engine = &self.engine;
        let error = err.to_error_object();
        if engine.jobs.fail(job_id, &error).await? {
            let meta = json!({ "error": error });
            engine
                .events
                .append(job_id, EventLevel::Error, "job failed", Some(&meta))
                .await?;
            engine.bus.broadcast(&BusEvent::JobStatus {
                job_id: job_id.clone(),
                status: JobStatus::Failed,
            });
            warn!(
                worker_id = self.id,
                job_id = %job_id,
                kind = err.kind(),
                error = %err.message(),
                "Job failed"
            );
        }
        Ok(())
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
