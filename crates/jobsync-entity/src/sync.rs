//! Connector sync state entities.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use jobsync_core::types::AccountId;
use jobsync_core::types::time::parse_timestamp;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::account::ConnectorSource;

/// Deterministic key addressing one sync state row.
///
/// `"{source}:{account_id}"` for a whole account, or
/// `"{source}:{account_id}:{sub_resource}"` for one sub-resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectorKey(String);

impl ConnectorKey {
    /// Key for an account as a whole.
    pub fn account(source: ConnectorSource, account_id: &AccountId) -> Self {
        Self(format!("{source}:{account_id}"))
    }

    /// Key for one sub-resource of an account.
    pub fn sub_resource(source: ConnectorSource, account_id: &AccountId, sub: &str) -> Self {
        Self(format!("{source}:{account_id}:{sub}"))
    }

    /// Prefix shared by every sub-resource key of the account.
    pub fn sub_resource_prefix(source: ConnectorSource, account_id: &AccountId) -> String {
        format!("{source}:{account_id}:")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Durable cursor and last-success time for one connector key.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ConnectorSyncState {
    /// Connector key.
    pub connector: String,
    /// Opaque provider cursor; `None` forces a full window.
    pub cursor: Option<String>,
    /// Raw timestamp of the last successful sync.
    pub last_sync_at: Option<String>,
}

impl ConnectorSyncState {
    /// Parsed `last_sync_at`; `None` when missing or unparseable.
    pub fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        self.last_sync_at.as_deref().and_then(parse_timestamp)
    }
}

/// Time range covered by a full-window fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SyncWindow {
    /// Window from `now - lookback_days` to `now + lookahead_days`.
    pub fn around(now: DateTime<Utc>, lookback_days: i64, lookahead_days: i64) -> Self {
        Self {
            start: now - Duration::days(lookback_days),
            end: now + Duration::days(lookahead_days),
        }
    }

    pub fn start_ts(&self) -> i64 {
        self.start.timestamp()
    }

    pub fn end_ts(&self) -> i64 {
        self.end.timestamp()
    }

    /// Whether an epoch-second timestamp falls inside the window (inclusive).
    pub fn contains_ts(&self, ts: i64) -> bool {
        ts >= self.start_ts() && ts <= self.end_ts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_keys() {
        let acct = AccountId::from_string("acct_1");
        assert_eq!(
            ConnectorKey::account(ConnectorSource::Calendar, &acct).as_str(),
            "calendar:acct_1"
        );
        let sub = ConnectorKey::sub_resource(ConnectorSource::Calendar, &acct, "primary");
        assert_eq!(sub.as_str(), "calendar:acct_1:primary");
        assert!(
            sub.as_str()
                .starts_with(&ConnectorKey::sub_resource_prefix(ConnectorSource::Calendar, &acct))
        );
    }

    #[test]
    fn test_unparseable_last_sync_is_none() {
        let state = ConnectorSyncState {
            connector: "jira:acct_1:activity".into(),
            cursor: None,
            last_sync_at: Some("yesterday-ish".into()),
        };
        assert!(state.last_sync_time().is_none());
    }

    #[test]
    fn test_window_bounds() {
        let now = Utc::now();
        let window = SyncWindow::around(now, 7, 0);
        assert!(window.contains_ts(now.timestamp()));
        assert!(!window.contains_ts((now - Duration::days(8)).timestamp()));
        assert_eq!(window.end_ts(), now.timestamp());
    }
}
