//! The adapter seam between providers and the shared sync algorithm.

use async_trait::async_trait;
use jobsync_entity::account::{ConnectorAccount, ConnectorSource};
use jobsync_entity::record::RemoteRecord;
use jobsync_entity::sync::SyncWindow;
use serde::{Deserialize, Serialize};

use crate::error::AdapterError;

/// One independently-cursored part of an account (e.g. a calendar).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubResource {
    /// Provider identifier, used in the connector key.
    pub id: String,
    /// Display name.
    pub name: String,
    /// IANA zone reported by the provider, if any.
    pub time_zone: Option<String>,
}

impl SubResource {
    /// The single implicit sub-resource of activity sources.
    pub fn activity() -> Self {
        Self {
            id: "activity".to_string(),
            name: "Activity".to_string(),
            time_zone: None,
        }
    }
}

/// What the algorithm asks an adapter to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchRequest {
    /// Everything inside the window.
    Full { window: SyncWindow },
    /// Changes since the stored cursor.
    Incremental { cursor: String },
}

/// Records returned by one fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchBatch {
    pub records: Vec<RemoteRecord>,
    /// Cursor to store for the next incremental fetch.
    pub next_cursor: Option<String>,
    /// Set when the batch is authoritative for this window.
    pub full_window: Option<SyncWindow>,
}

/// A provider-specific fetch/parse implementation.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Which source this adapter serves.
    fn source(&self) -> ConnectorSource;

    /// Enumerate the account's sub-resources.
    async fn list_sub_resources(
        &self,
        account: &ConnectorAccount,
    ) -> Result<Vec<SubResource>, AdapterError>;

    /// Fetch one sub-resource.
    async fn fetch(
        &self,
        account: &ConnectorAccount,
        sub: &SubResource,
        request: &FetchRequest,
    ) -> Result<FetchBatch, AdapterError>;
}
