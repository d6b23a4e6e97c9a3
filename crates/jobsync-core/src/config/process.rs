//! External process job configuration.

use serde::{Deserialize, Serialize};

/// Settings for `process.spawn` jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Program to execute. Resolved through `PATH` when not absolute.
    #[serde(default = "default_program")]
    pub program: String,
    /// Hard timeout applied when a job does not request one.
    #[serde(default = "default_timeout")]
    pub default_timeout_seconds: u64,
    /// Maximum lines per stream forwarded as live log frames.
    #[serde(default = "default_output_lines")]
    pub output_lines: usize,
    /// Messages kept per session; the oldest are dropped first.
    #[serde(default = "default_session_max_messages")]
    pub session_max_messages: usize,
    /// Total characters kept per session.
    #[serde(default = "default_session_max_chars")]
    pub session_max_chars: usize,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            default_timeout_seconds: default_timeout(),
            output_lines: default_output_lines(),
            session_max_messages: default_session_max_messages(),
            session_max_chars: default_session_max_chars(),
        }
    }
}

fn default_program() -> String {
    "claude".to_string()
}

fn default_timeout() -> u64 {
    600
}

fn default_output_lines() -> usize {
    200
}

fn default_session_max_messages() -> usize {
    20
}

fn default_session_max_chars() -> usize {
    12_000
}
