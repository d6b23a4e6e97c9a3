//! # jobsync-database
//!
//! SQLite connection management and concrete repository implementations
//! for jobs, job events, connector accounts, sync state, and synced records.

pub mod connection;
pub mod migration;
pub mod repositories;

pub use connection::DatabasePool;
