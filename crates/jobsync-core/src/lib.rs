//! # jobsync-core
//!
//! Core crate for JobSync. Contains configuration schemas, typed
//! identifiers, timestamp helpers, and the unified error system.
//!
//! This crate has **no** internal dependencies on other JobSync crates.

pub mod config;
pub mod error;
pub mod result;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
