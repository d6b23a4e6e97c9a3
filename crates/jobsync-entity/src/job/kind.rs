//! Job kind enumeration.

use std::fmt;
use std::str::FromStr;

use jobsync_core::AppError;
use serde::{Deserialize, Serialize};

use crate::account::ConnectorSource;

/// The closed set of job kinds the engine can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
pub enum JobKind {
    /// Simulated work used for smoke tests.
    #[serde(rename = "noop")]
    #[sqlx(rename = "noop")]
    Noop,
    /// Calendar connector sync.
    #[serde(rename = "connector.calendar.sync")]
    #[sqlx(rename = "connector.calendar.sync")]
    CalendarSync,
    /// Jira connector sync.
    #[serde(rename = "connector.jira.sync")]
    #[sqlx(rename = "connector.jira.sync")]
    JiraSync,
    /// Confluence connector sync.
    #[serde(rename = "connector.confluence.sync")]
    #[sqlx(rename = "connector.confluence.sync")]
    ConfluenceSync,
    /// Run the configured external CLI.
    #[serde(rename = "process.spawn")]
    #[sqlx(rename = "process.spawn")]
    ProcessSpawn,
}

impl JobKind {
    /// Every kind, in declaration order.
    pub const ALL: [JobKind; 5] = [
        Self::Noop,
        Self::CalendarSync,
        Self::JiraSync,
        Self::ConfluenceSync,
        Self::ProcessSpawn,
    ];

    /// Wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Noop => "noop",
            Self::CalendarSync => "connector.calendar.sync",
            Self::JiraSync => "connector.jira.sync",
            Self::ConfluenceSync => "connector.confluence.sync",
            Self::ProcessSpawn => "process.spawn",
        }
    }

    /// The connector source synced by this kind, if it is a sync kind.
    pub fn source(&self) -> Option<ConnectorSource> {
        match self {
            Self::CalendarSync => Some(ConnectorSource::Calendar),
            Self::JiraSync => Some(ConnectorSource::Jira),
            Self::ConfluenceSync => Some(ConnectorSource::Confluence),
            Self::Noop | Self::ProcessSpawn => None,
        }
    }

    /// The sync kind for a connector source.
    pub fn for_source(source: ConnectorSource) -> Self {
        match source {
            ConnectorSource::Calendar => Self::CalendarSync,
            ConnectorSource::Jira => Self::JiraSync,
            ConnectorSource::Confluence => Self::ConfluenceSync,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| AppError::validation(format!("Unknown job kind: {s}")))
    }
}
