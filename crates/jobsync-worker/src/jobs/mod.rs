//! Built-in job handlers.

pub mod noop;
pub mod process;
pub mod sync;

pub use noop::NoopHandler;
pub use process::ProcessSpawnHandler;
pub use sync::ConnectorSyncHandler;
