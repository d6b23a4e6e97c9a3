//! Retrying JSON client shared by the HTTP adapters.
//!
//! Rate limits (429) wait for `Retry-After` when present. Server errors and
//! network failures back off linearly. Both are retried at most
//! `max_retries` times before surfacing as [`AdapterError::Transient`].

use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::warn;

use jobsync_core::config::SyncConfig;
use jobsync_core::error::{AppError, ErrorKind};

use crate::error::AdapterError;

/// A `reqwest` client plus the retry policy.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    max_retries: u32,
    backoff: Duration,
}

impl ApiClient {
    /// Build a client with the configured timeouts and retry policy.
    pub fn new(config: &SyncConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_seconds))
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .user_agent(concat!("jobsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                AppError::with_source(ErrorKind::Configuration, "Failed to build HTTP client", e)
            })?;
        Ok(Self::with_client(
            client,
            config.max_retries,
            Duration::from_millis(config.retry_backoff_ms),
        ))
    }

    /// Wrap an existing client.
    pub fn with_client(client: Client, max_retries: u32, backoff: Duration) -> Self {
        Self {
            client,
            max_retries,
            backoff,
        }
    }

    /// Send the request produced by `build`, retrying transient failures,
    /// and decode the JSON body. An empty body decodes as `null`.
    pub async fn send_json<F>(&self, build: F) -> Result<serde_json::Value, AdapterError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut attempt = 0u32;
        loop {
            let response = match build(&self.client).send().await {
                Ok(response) => response,
                Err(e) if attempt < self.max_retries => {
                    warn!(attempt, error = %e, "Upstream request failed, retrying");
                    tokio::time::sleep(self.backoff_for(attempt)).await;
                    attempt += 1;
                    continue;
                }
                Err(e) => return Err(AdapterError::Transient(e.to_string())),
            };

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                if attempt < self.max_retries {
                    let delay = if status == StatusCode::TOO_MANY_REQUESTS {
                        retry_after(&response).unwrap_or_else(|| self.backoff_for(attempt))
                    } else {
                        self.backoff_for(attempt)
                    };
                    warn!(attempt, status = status.as_u16(), delay_ms = delay.as_millis() as u64, "Upstream unavailable, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                let detail = error_detail(response).await;
                return Err(AdapterError::Transient(format!("{status}: {detail}")));
            }

            return decode(response).await;
        }
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff * (attempt + 1)
    }
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

async fn error_detail(response: Response) -> String {
    let reason = response
        .status()
        .canonical_reason()
        .unwrap_or("error")
        .to_string();
    match response.text().await {
        Ok(text) if !text.trim().is_empty() => text.trim().chars().take(500).collect(),
        _ => reason,
    }
}

async fn decode(response: Response) -> Result<serde_json::Value, AdapterError> {
    let status = response.status();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            let detail = error_detail(response).await;
            return Err(AdapterError::Auth(format!(
                "{status}: {detail}. Reconnect the account to refresh its credentials"
            )));
        }
        StatusCode::GONE => return Err(AdapterError::CursorExpired),
        s if s.is_client_error() => {
            let message = error_detail(response).await;
            return Err(AdapterError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        _ => {}
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| AdapterError::Transient(e.to_string()))?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_slice(&bytes).map_err(|e| AdapterError::Decode(e.to_string()))
}
