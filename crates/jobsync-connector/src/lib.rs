//! # jobsync-connector
//!
//! Fetch/parse adapters for the external sources JobSync mirrors. Each
//! adapter turns provider responses into [`RemoteRecord`]s; the cursor
//! handling and reconciliation around them live in the worker.
//!
//! [`RemoteRecord`]: jobsync_entity::record::RemoteRecord

pub mod adapter;
pub mod atlassian;
pub mod confluence;
pub mod error;
pub mod google_calendar;
pub mod http;
pub mod jira;
pub mod registry;

pub use adapter::{FetchBatch, FetchRequest, SourceAdapter, SubResource};
pub use error::AdapterError;
pub use http::ApiClient;
pub use registry::AdapterRegistry;
