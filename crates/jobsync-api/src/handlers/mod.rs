//! HTTP request handlers, one module per resource.

pub mod accounts;
pub mod health;
pub mod jobs;
pub mod records;
pub mod sessions;
pub mod status;
pub mod ws;
