//! # jobsync-api
//!
//! HTTP API layer for JobSync built on Axum.
//!
//! Provides the job, account, record, and status endpoints, the live event
//! WebSocket, the backend-token middleware, extractors, DTOs, and error
//! mapping.

pub mod dto;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use error::ApiError;
pub use router::build_router;
pub use state::AppState;
