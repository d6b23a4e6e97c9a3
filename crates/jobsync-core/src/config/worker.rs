//! Worker pool configuration.

use serde::{Deserialize, Serialize};

/// Background job worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Whether the worker pool is started.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Number of concurrent worker loops.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Maximum number of job ids waiting in the queue. Submissions beyond
    /// this are rejected.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// How long shutdown waits for in-flight jobs, in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            concurrency: default_concurrency(),
            queue_capacity: default_queue_capacity(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    2
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_shutdown_timeout() -> u64 {
    30
}
