//! Adapter error types.

use thiserror::Error;

/// Failures an adapter can report to the sync algorithm.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdapterError {
    /// Credentials are missing, expired, or rejected (401/403).
    #[error("authorization failed: {0}")]
    Auth(String),

    /// The provider stayed unavailable after retries (429, 5xx, network).
    #[error("upstream temporarily unavailable: {0}")]
    Transient(String),

    /// The incremental cursor is no longer accepted (e.g. HTTP 410).
    #[error("sync cursor expired")]
    CursorExpired,

    /// The provider refused the request for a non-retryable reason.
    #[error("upstream rejected request ({status}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response detail.
        message: String,
    },

    /// Account settings are missing or malformed.
    #[error("connector misconfigured: {0}")]
    Config(String),

    /// The response could not be understood.
    #[error("unexpected upstream response: {0}")]
    Decode(String),
}

impl AdapterError {
    /// A paginated listing still had pages left after `max_pages` requests.
    ///
    /// Reported as transient so the sync keeps its previous state instead of
    /// committing (and pruning against) a partial listing.
    pub fn page_limit(max_pages: usize) -> Self {
        Self::Transient(format!("page limit reached after {max_pages} pages"))
    }

    /// Stable classification used in job error objects.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth",
            Self::Transient(_) => "transient",
            Self::CursorExpired | Self::Rejected { .. } | Self::Config(_) | Self::Decode(_) => {
                "permanent"
            }
        }
    }
}
