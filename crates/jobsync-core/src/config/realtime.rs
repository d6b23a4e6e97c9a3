//! Live event channel configuration.

use serde::{Deserialize, Serialize};

/// Event bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Outbound buffer per subscriber. A subscriber whose buffer is full
    /// when a frame is broadcast is dropped.
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer_size: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: default_channel_buffer(),
        }
    }
}

fn default_channel_buffer() -> usize {
    256
}
