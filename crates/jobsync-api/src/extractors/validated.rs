//! JSON body extractor that runs `validator` rules after deserializing.

use axum::Json;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;
use validator::Validate;

use jobsync_core::error::AppError;

use crate::error::ApiError;

/// Like `Json<T>`, but malformed bodies and failed validation both become
/// a 400 with the standard error body.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::validation(rejection.body_text()))?;
        value
            .validate()
            .map_err(|errors| AppError::validation(format!("Invalid request: {errors}")))?;
        Ok(Self(value))
    }
}
