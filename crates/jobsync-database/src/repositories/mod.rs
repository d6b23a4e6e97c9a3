//! Repository implementations for JobSync entities.

pub mod account;
pub mod job;
pub mod job_event;
pub mod record;
pub mod sub_resource;
pub mod sync_state;

pub use account::AccountRepository;
pub use job::JobRepository;
pub use job_event::JobEventRepository;
pub use record::{RecordQuery, RecordRepository};
pub use sub_resource::SubResourceRepository;
pub use sync_state::{CommitOutcome, SyncCommit, SyncStateRepository};
