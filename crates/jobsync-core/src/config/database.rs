//! Database configuration.

use serde::{Deserialize, Serialize};

/// SQLite database configuration.
///
/// The pool always holds a single connection: it is the one lock that
/// serializes every read and write against the job and sync-state tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite connection URL.
    #[serde(default = "default_url")]
    pub url: String,
    /// Time to wait for the storage connection, in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            connect_timeout_seconds: default_connect_timeout(),
        }
    }
}

fn default_url() -> String {
    "sqlite://data/index.db?mode=rwc".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}
