//! Core type definitions used across the JobSync workspace.

pub mod id;
pub mod time;

pub use id::*;
