//! Simulated work, used for smoke tests and health checks of the pipeline.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use jobsync_entity::job::JobKind;

use crate::context::JobContext;
use crate::executor::{JobExecutionError, JobHandler};

/// Maximum number of progress steps.
const MAX_STEPS: u64 = 5;
/// Duration covered by one step before the step count grows.
const STEP_MS: u64 = 200;

#[derive(Debug, Default, Deserialize)]
struct NoopPayload {
    #[serde(default)]
    simulate_ms: Option<f64>,
}

/// Handler for `noop` jobs.
#[derive(Debug, Default)]
pub struct NoopHandler;

/// Number of progress steps for a simulated duration.
pub fn step_count(duration_ms: u64) -> u64 {
    if duration_ms == 0 {
        1
    } else {
        (duration_ms / STEP_MS).clamp(1, MAX_STEPS)
    }
}

/// Progress after completing `step` (zero-based) of `steps`, rounded to two places.
fn step_progress(step: u64, steps: u64) -> f64 {
    ((step + 1) as f64 / steps as f64 * 100.0).round() / 100.0
}

#[async_trait]
impl JobHandler for NoopHandler {
    fn kind(&self) -> JobKind {
        JobKind::Noop
    }

    async fn execute(&self, ctx: &JobContext) -> Result<Value, JobExecutionError> {
        let payload: NoopPayload = ctx.payload_as().unwrap_or_default();
        let duration_ms = payload
            .simulate_ms
            .filter(|ms| ms.is_finite() && *ms > 0.0)
            .map_or(0, |ms| ms as u64);

        let steps = step_count(duration_ms);
        let pause = Duration::from_millis(duration_ms / steps);

        for step in 0..steps {
            if !pause.is_zero() {
                tokio::select! {
                    _ = ctx.cancel.cancelled() => {
                        return Err(JobExecutionError::Interrupted("interrupted by shutdown".into()));
                    }
                    _ = tokio::time::sleep(pause) => {}
                }
            }
            let progress = step_progress(step, steps);
            ctx.progress(progress, Some(&format!("progress {progress:.2}")))
                .await?;
        }

        Ok(json!({ "simulated_ms": duration_ms, "steps": steps }))
    }
}
