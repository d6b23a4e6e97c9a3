//! Backend-token authentication middleware.
//!
//! Every protected route requires the shared token, sent either as
//! `X-Backend-Token: <token>` or `Authorization: Bearer <token>`.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::{Authorization, HeaderMapExt};

use jobsync_core::error::AppError;

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the backend token.
pub const TOKEN_HEADER: &str = "x-backend-token";

/// Reject requests that do not present the configured backend token.
///
/// An empty configured token rejects everything.
pub async fn require_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let expected = state.config.auth.token.as_str();
    if !state.config.auth.is_configured() {
        tracing::warn!("Backend token is not configured, rejecting request");
        return Err(AppError::authentication("Backend token is not configured").into());
    }

    match presented_token(request.headers()) {
        Some(token) if constant_time_eq(token.as_bytes(), expected.as_bytes()) => {
            Ok(next.run(request).await)
        }
        Some(_) => Err(AppError::authentication("Invalid backend token").into()),
        None => Err(AppError::authentication("Missing backend token").into()),
    }
}

/// Token from `X-Backend-Token`, falling back to a bearer credential.
fn presented_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(value.trim().to_string());
    }
    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_backend_header_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(TOKEN_HEADER, HeaderValue::from_static("abc"));
        headers.insert("authorization", HeaderValue::from_static("Bearer other"));
        assert_eq!(presented_token(&headers).as_deref(), Some("abc"));
    }

    #[test]
    fn test_bearer_is_accepted() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc"));
        assert_eq!(presented_token(&headers).as_deref(), Some("abc"));

        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(presented_token(&headers), None);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"token", b"token"));
        assert!(!constant_time_eq(b"token", b"tokem"));
        assert!(!constant_time_eq(b"token", b"tok"));
    }
}
