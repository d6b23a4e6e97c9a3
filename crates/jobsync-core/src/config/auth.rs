//! Backend token configuration.

use serde::{Deserialize, Serialize};

/// Shared-secret token guarding every HTTP and WebSocket route.
///
/// An empty token is treated as misconfiguration: all guarded requests are
/// rejected until one is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// The expected token value.
    #[serde(default)]
    pub token: String,
}

impl AuthConfig {
    /// Whether a usable token is configured.
    pub fn is_configured(&self) -> bool {
        !self.token.trim().is_empty()
    }
}
