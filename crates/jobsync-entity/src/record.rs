//! Locally cached copies of remote records.

use chrono::{DateTime, Utc};
use jobsync_core::types::AccountId;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::account::ConnectorSource;

/// A remote record stored locally, keyed by `(connector, external_id)`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SyncedRecord {
    /// Sub-resource connector key the record was synced under.
    pub connector: String,
    /// Provider-assigned identifier, unique within the connector.
    pub external_id: String,
    pub source: ConnectorSource,
    pub account_id: AccountId,
    /// e.g. `event`, `issue`, `comment`, `page`.
    pub record_type: String,
    pub title: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub actor: Option<String>,
    pub status: Option<String>,
    /// Start as epoch seconds; records without one are never pruned.
    pub starts_ts: Option<i64>,
    pub ends_ts: Option<i64>,
    /// Provider-specific extras.
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A record as returned by a source adapter, before reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub external_id: String,
    pub record_type: String,
    pub title: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub actor: Option<String>,
    pub status: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub data: serde_json::Value,
    /// The provider reports the record as deleted or cancelled.
    pub removed: bool,
}

impl RemoteRecord {
    /// A minimal live record.
    pub fn new(
        external_id: impl Into<String>,
        record_type: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            record_type: record_type.into(),
            title: title.into(),
            description: None,
            url: None,
            actor: None,
            status: None,
            starts_at: None,
            ends_at: None,
            data: serde_json::Value::Null,
            removed: false,
        }
    }

    /// A tombstone for a record the provider deleted.
    pub fn removed(external_id: impl Into<String>) -> Self {
        Self {
            removed: true,
            ..Self::new(external_id, "removed", "")
        }
    }

    pub fn starts_ts(&self) -> Option<i64> {
        self.starts_at.map(|t| t.timestamp())
    }

    pub fn ends_ts(&self) -> Option<i64> {
        self.ends_at.map(|t| t.timestamp())
    }
}
