//! Convenience result type alias for JobSync.

use crate::error::AppError;

/// A specialized `Result` type for JobSync operations.
pub type AppResult<T> = Result<T, AppError>;
