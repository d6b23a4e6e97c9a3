//! # jobsync-worker
//!
//! Background job processing for JobSync. Provides:
//!
//! - The [`JobEngine`]: submission, cancellation, recovery, and the bounded queue
//! - A fixed pool of worker loops dispatching jobs by kind
//! - Built-in handlers for `noop`, `process.spawn`, and connector syncs
//! - Bounded conversation sessions for `process.spawn` prompts
//! - The shared connector sync algorithm with per-connector leases
//! - The due-connector scheduler

pub mod context;
pub mod engine;
pub mod executor;
pub mod jobs;
pub mod runner;
pub mod scheduler;
pub mod session;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use context::JobContext;
pub use engine::{EngineStatus, JobEngine};
pub use executor::{JobExecutionError, JobExecutor, JobHandler};
pub use scheduler::DueScheduler;
pub use session::SessionStore;
