//! Job executor: dispatches jobs to registered handlers by kind.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use jobsync_connector::AdapterError;
use jobsync_core::error::AppError;
use jobsync_entity::job::JobKind;

use crate::context::JobContext;

/// Trait for job handler implementations.
///
/// Handlers never change job status themselves. They report progress
/// through the context and return a result value or an error.
#[async_trait]
pub trait JobHandler: Send + Sync + std::fmt::Debug {
    /// The kind this handler processes.
    fn kind(&self) -> JobKind;

    /// Run the job.
    async fn execute(&self, ctx: &JobContext) -> Result<Value, JobExecutionError>;
}

/// Error from job execution.
#[derive(Debug, thiserror::Error)]
pub enum JobExecutionError {
    /// Bad input or a non-retryable upstream refusal.
    #[error("Permanent job failure: {0}")]
    Permanent(String),

    /// Upstream stayed unavailable after retries.
    #[error("Transient job failure: {0}")]
    Transient(String),

    /// Credentials are missing or rejected.
    #[error("Authorization failure: {0}")]
    Auth(String),

    /// The engine is shutting down.
    #[error("Job interrupted: {0}")]
    Interrupted(String),

    /// A failure carrying extra fields for the job's error object.
    #[error("{message}")]
    Detailed {
        kind: &'static str,
        message: String,
        details: Value,
    },

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(#[from] AppError),
}

impl JobExecutionError {
    /// Classification stored as `error.kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Permanent(_) => "permanent",
            Self::Transient(_) => "transient",
            Self::Auth(_) => "auth",
            Self::Interrupted(_) | Self::Internal(_) => "internal",
            Self::Detailed { kind, .. } => kind,
        }
    }

    /// The message without the variant prefix.
    pub fn message(&self) -> String {
        match self {
            Self::Permanent(m)
            | Self::Transient(m)
            | Self::Auth(m)
            | Self::Interrupted(m)
            | Self::Detailed { message: m, .. } => m.clone(),
            Self::Internal(e) => e.message.clone(),
        }
    }

    /// The `{message, kind, ...}` object persisted on a failed job.
    pub fn to_error_object(&self) -> Value {
        let mut object = json!({
            "message": self.message(),
            "kind": self.kind(),
        });
        if let (Self::Detailed { details, .. }, Some(map)) = (self, object.as_object_mut()) {
            if let Some(extra) = details.as_object() {
                for (key, value) in extra {
                    map.entry(key.clone()).or_insert_with(|| value.clone());
                }
            }
        }
        object
    }
}

impl From<AdapterError> for JobExecutionError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Auth(message) => Self::Auth(format!(
                "{message}. Update the account credentials and retry the sync"
            )),
            AdapterError::Transient(message) => Self::Transient(message),
            other => Self::Permanent(other.to_string()),
        }
    }
}

/// Dispatches jobs to the handler registered for their kind.
#[derive(Debug, Default)]
pub struct JobExecutor {
    handlers: HashMap<JobKind, Arc<dyn JobHandler>>,
}

impl JobExecutor {
    /// Create an executor with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job handler, replacing any previous one for its kind.
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        let kind = handler.kind();
        tracing::info!(kind = %kind, "Registered job handler");
        self.handlers.insert(kind, handler);
    }

    /// Run a job with its registered handler.
    pub async fn execute(&self, ctx: &JobContext) -> Result<Value, JobExecutionError> {
        let kind = ctx.job.kind;
        let handler = self.handlers.get(&kind).ok_or_else(|| {
            JobExecutionError::Permanent(format!("No handler registered for job kind '{kind}'"))
        })?;

        tracing::info!(job_id = %ctx.job.id, kind = %kind, "Executing job");
        handler.execute(ctx).await
    }

    /// Check if a handler is registered for a kind.
    pub fn has_handler(&self, kind: JobKind) -> bool {
        self.handlers.contains_key(&kind)
    }
}
