//! Due-connector scheduler configuration.

use serde::{Deserialize, Serialize};

/// Periodic sync scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Whether the scheduler runs.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Interval between ticks, and the age at which a connector becomes due.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_seconds: default_poll_interval(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    600
}
