//! Application configuration schemas.
//!
//! All configuration structs are deserialized via the `config` crate from
//! `config/default`, an environment overlay, and `JOBSYNC__*` environment
//! variables. Every section and field has a default so an empty
//! configuration yields a runnable local setup.

pub mod app;
pub mod auth;
pub mod database;
pub mod logging;
pub mod process;
pub mod realtime;
pub mod scheduler;
pub mod sync;
pub mod worker;

use serde::{Deserialize, Serialize};

pub use self::app::{CorsConfig, ServerConfig};
pub use self::auth::AuthConfig;
pub use self::database::DatabaseConfig;
pub use self::logging::LoggingConfig;
pub use self::process::ProcessConfig;
pub use self::realtime::RealtimeConfig;
pub use self::scheduler::SchedulerConfig;
pub use self::sync::SyncConfig;
pub use self::worker::WorkerConfig;

use crate::error::AppError;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Backend token settings.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Worker pool settings.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Due-connector scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Connector sync settings.
    #[serde(default)]
    pub sync: SyncConfig,
    /// External process job settings.
    #[serde(default)]
    pub process: ProcessConfig,
    /// Live event channel settings.
    #[serde(default)]
    pub realtime: RealtimeConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from files and the environment.
    ///
    /// Merges `config/default` with `config/{env}` and environment variables
    /// prefixed with `JOBSYNC__` (e.g. `JOBSYNC__AUTH__TOKEN`).
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("JOBSYNC")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }
}
