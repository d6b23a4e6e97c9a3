//! Application state shared across all handlers and middleware.

use std::sync::Arc;

use jobsync_core::config::AppConfig;
use jobsync_database::DatabasePool;
use jobsync_database::repositories::{AccountRepository, RecordRepository, SubResourceRepository};
use jobsync_realtime::EventBus;
use jobsync_worker::{JobEngine, SessionStore};

/// Application state containing all shared dependencies.
///
/// Passed to every Axum handler via `State<AppState>`.
#[derive(Debug, Clone)]
pub struct AppState {
    // ── Configuration ────────────────────────────────────────
    pub config: Arc<AppConfig>,

    // ── Infrastructure ───────────────────────────────────────
    /// SQLite connection pool
    pub db: Arc<DatabasePool>,
    /// Live event fan-out
    pub bus: Arc<EventBus>,
    /// Job submission, lookup, and cancellation
    pub engine: Arc<JobEngine>,
    /// Conversation history for `process.spawn` prompts
    pub sessions: Arc<SessionStore>,

    // ── Repositories ─────────────────────────────────────────
    pub accounts: Arc<AccountRepository>,
    pub records: Arc<RecordRepository>,
    pub sub_resources: Arc<SubResourceRepository>,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        db: Arc<DatabasePool>,
        bus: Arc<EventBus>,
        engine: Arc<JobEngine>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        let pool = db.pool().clone();
        Self {
            config,
            db,
            bus,
            engine,
            sessions,
            accounts: Arc::new(AccountRepository::new(pool.clone())),
            records: Arc::new(RecordRepository::new(pool.clone())),
            sub_resources: Arc::new(SubResourceRepository::new(pool)),
        }
    }
}
