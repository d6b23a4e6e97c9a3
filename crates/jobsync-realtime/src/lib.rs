//! # jobsync-realtime
//!
//! Live event fan-out for JobSync. Provides:
//!
//! - Typed outbound frames (`job.status`, `job.progress`, `log`, ...)
//! - Subscriber handles backed by bounded channels
//! - The [`EventBus`], which drops any subscriber it fails to deliver to

pub mod bus;
pub mod message;
pub mod subscriber;

pub use bus::EventBus;
pub use message::BusEvent;
pub use subscriber::{SubscriberHandle, SubscriberId};
