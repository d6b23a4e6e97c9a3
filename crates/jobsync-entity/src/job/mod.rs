//! Background job domain entities.

pub mod event;
pub mod kind;
pub mod model;
pub mod status;

pub use event::{EventLevel, JobEvent};
pub use kind::JobKind;
pub use model::Job;
pub use status::JobStatus;
