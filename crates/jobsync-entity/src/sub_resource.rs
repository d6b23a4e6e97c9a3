//! Discovered sub-resources and their selection flag.

use chrono::{DateTime, Utc};
use jobsync_core::types::AccountId;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::account::ConnectorSource;

/// A sub-resource last reported for an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SubResourceEntry {
    pub account_id: AccountId,
    /// Provider id, e.g. a calendar id.
    pub sub_id: String,
    pub source: ConnectorSource,
    pub name: String,
    pub time_zone: Option<String>,
    /// Unselected sub-resources are not synced.
    pub selected: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A sub-resource as reported by the provider.
#[derive(Debug, Clone, Copy)]
pub struct DiscoveredSubResource<'a> {
    pub sub_id: &'a str,
    pub name: &'a str,
    pub time_zone: Option<&'a str>,
}
