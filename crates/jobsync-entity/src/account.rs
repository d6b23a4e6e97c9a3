//! Connector account entities.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use jobsync_core::AppError;
use jobsync_core::types::AccountId;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// External data source a connector account pulls from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConnectorSource {
    /// Calendar events.
    Calendar,
    /// Issue-tracker activity.
    Jira,
    /// Wiki activity.
    Confluence,
}

impl ConnectorSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Calendar => "calendar",
            Self::Jira => "jira",
            Self::Confluence => "confluence",
        }
    }
}

impl fmt::Display for ConnectorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectorSource {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "calendar" => Ok(Self::Calendar),
            "jira" => Ok(Self::Jira),
            "confluence" => Ok(Self::Confluence),
            other => Err(AppError::validation(format!(
                "Unknown connector source: {other}"
            ))),
        }
    }
}

/// A registered connector instance.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ConnectorAccount {
    /// Unique account identifier.
    pub account_id: AccountId,
    /// Which source this account syncs.
    pub source: ConnectorSource,
    /// Human-readable label.
    pub display_name: String,
    /// Non-secret settings (base_url, email, provider, ...).
    pub settings: serde_json::Value,
    /// Secret material (tokens). Never serialized.
    #[serde(skip_serializing, default)]
    pub credentials: serde_json::Value,
    /// When the account was registered.
    pub created_at: DateTime<Utc>,
    /// When the account was last modified.
    pub updated_at: DateTime<Utc>,
}

impl ConnectorAccount {
    /// Read a string setting, ignoring blank values.
    pub fn setting(&self, key: &str) -> Option<&str> {
        non_blank(&self.settings, key)
    }

    /// Read a string credential, ignoring blank values.
    pub fn credential(&self, key: &str) -> Option<&str> {
        non_blank(&self.credentials, key)
    }
}

fn non_blank<'a>(value: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Data required to register a connector account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccount {
    pub source: ConnectorSource,
    pub display_name: String,
    pub settings: serde_json::Value,
    pub credentials: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn account() -> ConnectorAccount {
        ConnectorAccount {
            account_id: AccountId::from_string("acct_1"),
            source: ConnectorSource::Jira,
            display_name: "Work Jira".into(),
            settings: json!({"base_url": "https://x.atlassian.net", "email": "  "}),
            credentials: json!({"api_token": "secret"}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_credentials_are_not_serialized() {
        let value = serde_json::to_value(account()).unwrap();
        assert!(value.get("credentials").is_none());
        assert_eq!(value["source"], "jira");
    }

    #[test]
    fn test_blank_settings_are_absent() {
        let acct = account();
        assert_eq!(acct.setting("base_url"), Some("https://x.atlassian.net"));
        assert_eq!(acct.setting("email"), None);
        assert_eq!(acct.credential("api_token"), Some("secret"));
    }

    #[test]
    fn test_parse_source() {
        assert_eq!(
            "confluence".parse::<ConnectorSource>().unwrap(),
            ConnectorSource::Confluence
        );
        assert!("slack".parse::<ConnectorSource>().is_err());
    }
}
