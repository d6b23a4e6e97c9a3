//! The connector sync algorithm shared by every source.

pub mod algorithm;
pub mod lease;

pub use algorithm::{SyncEngine, SyncOutcome, SyncRequest};
pub use lease::{LeaseGuard, LeaseTable};
