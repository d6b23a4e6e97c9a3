//! Pieces shared by the Jira and Confluence activity adapters.

use chrono::{DateTime, TimeZone, Utc};
use jobsync_core::types::time::{format_timestamp, parse_timestamp};
use jobsync_entity::account::ConnectorAccount;
use jobsync_entity::record::RemoteRecord;
use serde_json::Value;

use crate::adapter::FetchRequest;
use crate::error::AdapterError;

/// Site URL and basic-auth pair for an Atlassian Cloud account.
#[derive(Debug, Clone)]
pub struct AtlassianSite {
    pub base_url: String,
    pub email: String,
    pub api_token: String,
}

impl AtlassianSite {
    /// Read the site from account settings and credentials.
    ///
    /// `base_url` may also be given as a bare org name (`acme`).
    pub fn from_account(account: &ConnectorAccount) -> Result<Self, AdapterError> {
        let base_url = account
            .setting("base_url")
            .map(normalize_base_url)
            .ok_or_else(|| AdapterError::Config("settings.base_url is required".into()))?;
        let email = account
            .setting("email")
            .or_else(|| account.credential("email"))
            .ok_or_else(|| AdapterError::Auth("no email configured for this account".into()))?;
        let api_token = account.credential("api_token").ok_or_else(|| {
            AdapterError::Auth("no API token stored for this account; reconnect it".into())
        })?;
        Ok(Self {
            base_url,
            email: email.to_string(),
            api_token: api_token.to_string(),
        })
    }
}

fn normalize_base_url(value: &str) -> String {
    let trimmed = value.trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}.atlassian.net")
    }
}

/// Lower bound for activity to include.
///
/// Incremental cursors hold the start time of the previous fetch; a cursor
/// that does not parse is treated as expired.
pub fn since_for(request: &FetchRequest) -> Result<DateTime<Utc>, AdapterError> {
    match request {
        FetchRequest::Full { window } => Ok(window.start),
        FetchRequest::Incremental { cursor } => {
            parse_timestamp(cursor).ok_or(AdapterError::CursorExpired)
        }
    }
}

/// Whole days between `since` and `now`, at least one.
pub fn lookback_days(since: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let seconds = (now - since).num_seconds().max(0);
    ((seconds + 86_399) / 86_400).max(1)
}

/// Parse a provider timestamp to epoch seconds.
pub fn epoch(value: Option<&Value>) -> Option<i64> {
    value
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
        .map(|t| t.timestamp())
}

/// Fields of one normalized activity entry.
#[derive(Debug, Clone)]
pub struct Activity<'a> {
    pub event_id: String,
    pub event_type: String,
    pub title: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub actor: Option<String>,
    pub status: Option<String>,
    pub event_ts: i64,
    pub raw: Value,
    pub source: &'a str,
}

impl Activity<'_> {
    pub fn into_record(self) -> RemoteRecord {
        let at = Utc.timestamp_opt(self.event_ts, 0).single();
        let mut data = serde_json::json!({
            "source": self.source,
            "event_time": at.map(format_timestamp),
        });
        if let (Some(obj), Value::Object(raw)) = (data.as_object_mut(), self.raw) {
            obj.extend(raw);
        }
        RemoteRecord {
            external_id: self.event_id,
            record_type: self.event_type,
            title: self.title,
            description: self.description,
            url: self.url,
            actor: self.actor,
            status: self.status,
            starts_at: at,
            ends_at: None,
            data,
            removed: false,
        }
    }
}

/// `accountId` and `displayName` of an Atlassian user object.
pub fn user_ref(value: &Value) -> (Option<&str>, Option<&str>) {
    (
        value.get("accountId").and_then(Value::as_str),
        value.get("displayName").and_then(Value::as_str),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use jobsync_entity::sync::SyncWindow;

    #[test]
    fn test_lookback_days_rounds_up() {
        let now = Utc::now();
        assert_eq!(lookback_days(now, now), 1);
        assert_eq!(lookback_days(now - Duration::hours(25), now), 2);
        assert_eq!(lookback_days(now - Duration::days(7), now), 7);
    }

    #[test]
    fn test_since_for_requests() {
        let now = Utc::now();
        let window = SyncWindow::around(now, 7, 0);
        assert_eq!(since_for(&FetchRequest::Full { window }).unwrap(), window.start);
        assert_eq!(
            since_for(&FetchRequest::Incremental {
                cursor: "garbage".into()
            })
            .unwrap_err(),
            AdapterError::CursorExpired
        );
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("acme"), "https://acme.atlassian.net");
        assert_eq!(
            normalize_base_url("http://127.0.0.1:9000/"),
            "http://127.0.0.1:9000"
        );
    }
}
