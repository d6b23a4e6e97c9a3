//! Outbound live frame definitions.

use jobsync_core::types::time::utc_now;
use jobsync_core::types::{AccountId, JobId};
use jobsync_entity::account::ConnectorSource;
use jobsync_entity::job::{EventLevel, JobStatus};
use serde::{Deserialize, Serialize};

/// Frames pushed to every live subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BusEvent {
    /// First frame on every new subscription.
    #[serde(rename = "connected")]
    Connected {
        /// Server time.
        timestamp: String,
    },
    /// A job changed status.
    #[serde(rename = "job.status")]
    JobStatus {
        job_id: JobId,
        status: JobStatus,
    },
    /// A running job reported progress.
    #[serde(rename = "job.progress")]
    JobProgress {
        job_id: JobId,
        progress: f64,
    },
    /// A log line from the engine or a job.
    #[serde(rename = "log")]
    Log {
        level: EventLevel,
        message: String,
        timestamp: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meta: Option<serde_json::Value>,
    },
    /// A connector finished syncing.
    #[serde(rename = "connector.sync")]
    ConnectorSync {
        source: ConnectorSource,
        account_id: AccountId,
        synced_records: u64,
        timestamp: String,
    },
}

impl BusEvent {
    /// A `connected` frame stamped now.
    pub fn connected() -> Self {
        Self::Connected {
            timestamp: utc_now(),
        }
    }

    /// The frame's `type` tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::JobStatus { .. } => "job.status",
            Self::JobProgress { .. } => "job.progress",
            Self::Log { .. } => "log",
            Self::ConnectorSync { .. } => "connector.sync",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_frame_shape() {
        let frame = BusEvent::JobStatus {
            job_id: JobId::from_string("job_1"),
            status: JobStatus::Running,
        };
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({"type": "job.status", "job_id": "job_1", "status": "running"})
        );
    }

    #[test]
    fn test_log_frame_omits_missing_meta() {
        let frame = BusEvent::Log {
            level: EventLevel::Warn,
            message: "slow".into(),
            timestamp: "2024-05-01T00:00:00Z".into(),
            meta: None,
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "log");
        assert_eq!(value["level"], "warn");
        assert!(value.get("meta").is_none());
        assert_eq!(frame.event_type(), "log");
    }
}
