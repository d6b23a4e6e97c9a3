//! # jobsync-entity
//!
//! Domain entity models for JobSync. Database entities derive
//! `sqlx::FromRow`; enums stored as text derive `sqlx::Type`.

pub mod account;
pub mod job;
pub mod record;
pub mod sub_resource;
pub mod sync;
