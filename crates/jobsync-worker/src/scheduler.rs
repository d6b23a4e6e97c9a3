//! Due-connector scheduler.
//!
//! On a fixed interval every registered account is checked, and a sync job
//! is submitted for each account whose oldest sub-resource sync is at least
//! one interval old.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::json;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job as CronJob, JobScheduler};

use jobsync_core::config::SchedulerConfig;
use jobsync_core::error::AppError;
use jobsync_core::result::AppResult;
use jobsync_core::types::{AccountId, JobId};
use jobsync_database::repositories::AccountRepository;
use jobsync_entity::account::ConnectorAccount;
use jobsync_entity::job::JobKind;
use jobsync_entity::sync::ConnectorKey;

use crate::engine::JobEngine;
use crate::sync::SyncEngine;

/// Periodically enqueues sync jobs for due connector accounts.
pub struct DueScheduler {
    engine: Arc<JobEngine>,
    sync: Arc<SyncEngine>,
    accounts: AccountRepository,
    interval: Duration,
    /// Last job submitted per account by this scheduler.
    pending: DashMap<AccountId, JobId>,
    cron: Mutex<Option<JobScheduler>>,
}

impl std::fmt::Debug for DueScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DueScheduler")
            .field("interval", &self.interval)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl DueScheduler {
    pub fn new(
        engine: Arc<JobEngine>,
        sync: Arc<SyncEngine>,
        pool: SqlitePool,
        config: &SchedulerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            engine,
            sync,
            accounts: AccountRepository::new(pool),
            interval: Duration::from_secs(config.poll_interval_seconds.max(1)),
            pending: DashMap::new(),
            cron: Mutex::new(None),
        })
    }

    /// Run the first tick now, then schedule the rest.
    pub async fn start(self: &Arc<Self>) -> Result<(), AppError> {
        self.run_tick().await;

        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::internal(format!("Failed to create scheduler: {e}")))?;

        let this = Arc::clone(self);
        let job = CronJob::new_repeated_async(self.interval, move |_uuid, _lock| {
            let this = Arc::clone(&this);
            Box::pin(async move {
                this.run_tick().await;
            })
        })
        .map_err(|e| AppError::internal(format!("Failed to create scheduler job: {e}")))?;

        scheduler
            .add(job)
            .await
            .map_err(|e| AppError::internal(format!("Failed to add scheduler job: {e}")))?;
        scheduler
            .start()
            .await
            .map_err(|e| AppError::internal(format!("Failed to start scheduler: {e}")))?;

        *self.cron.lock().await = Some(scheduler);
        tracing::info!(interval_secs = self.interval.as_secs(), "Due-connector scheduler started");
        Ok(())
    }

    /// Stop scheduling further ticks.
    pub async fn shutdown(&self) -> Result<(), AppError> {
        if let Some(mut scheduler) = self.cron.lock().await.take() {
            scheduler
                .shutdown()
                .await
                .map_err(|e| AppError::internal(format!("Failed to shutdown scheduler: {e}")))?;
            tracing::info!("Due-connector scheduler shut down");
        }
        Ok(())
    }

    async fn run_tick(&self) {
        match self.tick().await {
            Ok(0) => tracing::debug!("Scheduler tick: no connectors due"),
            Ok(submitted) => tracing::info!(submitted, "Scheduler tick submitted sync jobs"),
            Err(e) => tracing::error!(error = %e, "Scheduler tick failed"),
        }
    }

    /// Check every account once. Returns the number of jobs submitted.
    pub async fn tick(&self) -> AppResult<usize> {
        if self.engine.is_shutting_down() {
            return Ok(0);
        }

        let accounts = self.accounts.list(None).await?;
        self.pending
            .retain(|id, _| accounts.iter().any(|account| &account.account_id == id));

        let mut submitted = 0;
        for account in &accounts {
            match self.submit_if_due(account).await {
                Ok(true) => submitted += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(
                    account_id = %account.account_id,
                    source = %account.source,
                    error = %e,
                    "Failed to schedule connector sync"
                ),
            }
        }
        Ok(submitted)
    }

    async fn submit_if_due(&self, account: &ConnectorAccount) -> AppResult<bool> {
        let key = ConnectorKey::account(account.source, &account.account_id);
        if self.sync.leases().is_held(&key) {
            tracing::debug!(connector = %key, "Sync in progress, not scheduling");
            return Ok(false);
        }
        if self.has_pending_job(&account.account_id).await? {
            return Ok(false);
        }

        let last_sync = self.sync.account_last_sync(account).await?;
        let due = match last_sync {
            None => true,
            Some(at) => Utc::now()
                .signed_duration_since(at)
                .to_std()
                .is_ok_and(|age| age >= self.interval),
        };
        if !due {
            return Ok(false);
        }

        let job_id = self
            .engine
            .submit(
                JobKind::for_source(account.source),
                json!({ "account_id": account.account_id }),
            )
            .await?;
        tracing::info!(connector = %key, job_id = %job_id, "Scheduled connector sync");
        self.pending.insert(account.account_id.clone(), job_id);
        Ok(true)
    }

    /// Whether an earlier scheduled job for the account has not finished yet.
    async fn has_pending_job(&self, account_id: &AccountId) -> AppResult<bool> {
        let Some(job_id) = self.pending.get(account_id).map(|entry| entry.value().clone()) else {
            return Ok(false);
        };
        let finished = match self.engine.get(&job_id).await {
            Ok(job) => job.is_terminal(),
            Err(e) if e.kind == jobsync_core::error::ErrorKind::NotFound => true,
            Err(e) => return Err(e),
        };
        if finished {
            self.pending.remove(account_id);
        }
        Ok(!finished)
    }
}
