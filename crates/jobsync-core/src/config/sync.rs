//! Connector sync configuration.

use serde::{Deserialize, Serialize};

/// Settings shared by every connector sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Days before now covered by a full calendar fetch.
    #[serde(default = "default_calendar_lookback")]
    pub calendar_lookback_days: i64,
    /// Days after now covered by a full calendar fetch.
    #[serde(default = "default_calendar_lookahead")]
    pub calendar_lookahead_days: i64,
    /// Days before now covered by a full issue-tracker or wiki fetch.
    #[serde(default = "default_activity_lookback")]
    pub activity_lookback_days: i64,
    /// How long a connector lease is honored before it is considered stale.
    #[serde(default = "default_lease_ttl")]
    pub lease_ttl_seconds: u64,
    /// Total HTTP request timeout for adapters.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,
    /// HTTP connect timeout for adapters.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    /// Retries for rate-limited or server-failed requests.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base backoff between retries, in milliseconds.
    #[serde(default = "default_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Page size requested from remote APIs.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            calendar_lookback_days: default_calendar_lookback(),
            calendar_lookahead_days: default_calendar_lookahead(),
            activity_lookback_days: default_activity_lookback(),
            lease_ttl_seconds: default_lease_ttl(),
            http_timeout_seconds: default_http_timeout(),
            connect_timeout_seconds: default_connect_timeout(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_backoff_ms(),
            page_size: default_page_size(),
        }
    }
}

fn default_calendar_lookback() -> i64 {
    30
}

fn default_calendar_lookahead() -> i64 {
    90
}

fn default_activity_lookback() -> i64 {
    7
}

fn default_lease_ttl() -> u64 {
    900
}

fn default_http_timeout() -> u64 {
    20
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_ms() -> u64 {
    500
}

fn default_page_size() -> u32 {
    50
}
