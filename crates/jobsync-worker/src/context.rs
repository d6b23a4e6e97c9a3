//! Per-job execution context handed to handlers.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use jobsync_core::result::AppResult;
use jobsync_database::repositories::{JobEventRepository, JobRepository};
use jobsync_entity::job::{EventLevel, Job};
use jobsync_realtime::{BusEvent, EventBus};

use crate::executor::JobExecutionError;

/// Everything a handler may touch while running one job.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Snapshot of the job as claimed (status `running`).
    pub job: Job,
    /// Fires when the engine shuts down.
    pub cancel: CancellationToken,
    jobs: JobRepository,
    events: JobEventRepository,
    bus: Arc<EventBus>,
}

impl JobContext {
    pub(crate) fn new(
        job: Job,
        cancel: CancellationToken,
        jobs: JobRepository,
        events: JobEventRepository,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            job,
            cancel,
            jobs,
            events,
            bus,
        }
    }

    /// Raw job payload.
    pub fn payload(&self) -> &Value {
        &self.job.payload
    }

    /// Deserialize the payload, failing the job permanently if it does not fit.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, JobExecutionError> {
        serde_json::from_value(self.job.payload.clone())
            .map_err(|e| JobExecutionError::Permanent(format!("invalid payload: {e}")))
    }

    /// Record progress and broadcast a `job.progress` frame.
    ///
    /// Values are clamped to `0.0..=1.0`. Nothing is broadcast once the job
    /// has left `running`.
    pub async fn progress(&self, progress: f64, message: Option<&str>) -> AppResult<()> {
        let progress = if progress.is_finite() {
            progress.clamp(0.0, 1.0)
        } else {
            0.0
        };
        if self.jobs.update_progress(&self.job.id, progress, message).await? {
            self.bus.broadcast(&BusEvent::JobProgress {
                job_id: self.job.id.clone(),
                progress,
            });
        }
        Ok(())
    }

    /// Append a JobEvent and mirror it as a `log` frame.
    pub async fn event(&self, level: EventLevel, message: &str, meta: Option<Value>) -> AppResult<()> {
        self.events
            .append(&self.job.id, level, message, meta.as_ref())
            .await?;
        self.log(level, message, meta);
        Ok(())
    }

    /// Broadcast a `log` frame tagged with this job, without persisting it.
    pub fn log(&self, level: EventLevel, message: &str, meta: Option<Value>) {
        let mut tagged = match meta {
            Some(Value::Object(map)) => Value::Object(map),
            Some(other) => json!({ "detail": other }),
            None => json!({}),
        };
        if let Some(map) = tagged.as_object_mut() {
            map.insert("job_id".into(), json!(self.job.id));
        }
        self.bus.emit_log(level, message, Some(tagged));
    }

    /// The shared event bus.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }
}
