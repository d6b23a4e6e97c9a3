//! Per-sub-resource fetch, reconcile, and cursor advance.
//!
//! For every sub-resource of an account the stored cursor decides between
//! an incremental and a full-window fetch. The adapter's batch is then
//! reconciled and the cursor advanced in one transaction, so a failed
//! sub-resource keeps its previous state.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::SqlitePool;

use jobsync_connector::{
    AdapterError, AdapterRegistry, FetchBatch, FetchRequest, SourceAdapter, SubResource,
};
use jobsync_core::config::SyncConfig;
use jobsync_core::result::AppResult;
use jobsync_core::types::AccountId;
use jobsync_core::types::time::{format_timestamp, utc_now};
use jobsync_database::repositories::{
    AccountRepository, SubResourceRepository, SyncCommit, SyncStateRepository,
};
use jobsync_entity::account::{ConnectorAccount, ConnectorSource};
use jobsync_entity::job::EventLevel;
use jobsync_entity::sub_resource::DiscoveredSubResource;
use jobsync_entity::sync::{ConnectorKey, SyncWindow};
use jobsync_realtime::BusEvent;

use crate::context::JobContext;
use crate::executor::JobExecutionError;
use crate::sync::lease::LeaseTable;

/// Payload of every `connector.*.sync` job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
    pub account_id: AccountId,
    #[serde(default)]
    pub force: bool,
}

/// Result of a completed sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub account_id: AccountId,
    pub source: ConnectorSource,
    pub synced_records: u64,
    pub deleted_records: u64,
    pub sub_resources: usize,
    /// Reported sub-resources left out because they are not selected.
    pub skipped_sub_resources: usize,
    pub last_sync_at: String,
}

/// Runs syncs for every source through its adapter.
#[derive(Debug)]
pub struct SyncEngine {
    adapters: AdapterRegistry,
    accounts: AccountRepository,
    states: SyncStateRepository,
    sub_resources: SubResourceRepository,
    leases: Arc<LeaseTable>,
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(
        adapters: AdapterRegistry,
        pool: SqlitePool,
        leases: Arc<LeaseTable>,
        config: SyncConfig,
    ) -> Self {
        Self {
            adapters,
            accounts: AccountRepository::new(pool.clone()),
            states: SyncStateRepository::new(pool.clone()),
            sub_resources: SubResourceRepository::new(pool),
            leases,
            config,
        }
    }

    /// Lease table shared with the scheduler.
    pub fn leases(&self) -> &Arc<LeaseTable> {
        &self.leases
    }

    /// Window covered by a full fetch of `source` at `now`.
    pub fn full_window(&self, source: ConnectorSource, now: DateTime<Utc>) -> SyncWindow {
        match source {
            ConnectorSource::Calendar => SyncWindow::around(
                now,
                self.config.calendar_lookback_days,
                self.config.calendar_lookahead_days,
            ),
            ConnectorSource::Jira | ConnectorSource::Confluence => {
                SyncWindow::around(now, self.config.activity_lookback_days, 0)
            }
        }
    }

    /// The oldest successful sync across the account's selected sub-resources.
    ///
    /// `None` means the account is due: nothing was ever synced, or a stored
    /// timestamp could not be parsed.
    pub async fn account_last_sync(
        &self,
        account: &ConnectorAccount,
    ) -> AppResult<Option<DateTime<Utc>>> {
        let unselected: HashSet<String> = self
            .sub_resources
            .list_for_account(&account.account_id, false)
            .await?
            .into_iter()
            .filter(|entry| !entry.selected)
            .map(|entry| {
                ConnectorKey::sub_resource(account.source, &account.account_id, &entry.sub_id)
                    .as_str()
                    .to_string()
            })
            .collect();
        let states: Vec<_> = self
            .states
            .list_for_account(account.source, &account.account_id)
            .await?
            .into_iter()
            .filter(|state| !unselected.contains(&state.connector))
            .collect();

        if states.is_empty() {
            let key = ConnectorKey::account(account.source, &account.account_id);
            return Ok(self
                .states
                .get(&key)
                .await?
                .and_then(|state| state.last_sync_time()));
        }

        let mut oldest: Option<DateTime<Utc>> = None;
        for state in &states {
            let Some(at) = state.last_sync_time() else {
                return Ok(None);
            };
            oldest = Some(oldest.map_or(at, |current| current.min(at)));
        }
        Ok(oldest)
    }

    /// Sync one account as part of a job.
    pub async fn run(
        &self,
        ctx: &JobContext,
        source: ConnectorSource,
        request: &SyncRequest,
    ) -> Result<Value, JobExecutionError> {
        let account = self
            .accounts
            .find_by_id(&request.account_id)
            .await?
            .ok_or_else(|| {
                JobExecutionError::Permanent(format!(
                    "connector account {} not found",
                    request.account_id
                ))
            })?;
        if account.source != source {
            return Err(JobExecutionError::Permanent(format!(
                "account {} is a {} account, not {source}",
                account.account_id, account.source
            )));
        }
        let adapter = self.adapters.get(source).ok_or_else(|| {
            JobExecutionError::Permanent(format!("no adapter registered for {source}"))
        })?;

        let account_key = ConnectorKey::account(source, &account.account_id);
        let Some(_lease) = self.leases.try_acquire(&account_key) else {
            ctx.event(
                EventLevel::Info,
                "sync skipped: already in progress",
                Some(json!({ "connector": account_key })),
            )
            .await?;
            return Ok(json!({
                "skipped": true,
                "reason": "sync already in progress",
                "account_id": account.account_id,
                "source": source,
            }));
        };

        ctx.event(
            EventLevel::Info,
            &format!("{source} sync started"),
            Some(json!({ "account_id": account.account_id, "force": request.force })),
        )
        .await?;

        let subs = adapter.list_sub_resources(&account).await?;
        let discovered: Vec<DiscoveredSubResource<'_>> = subs
            .iter()
            .map(|sub| DiscoveredSubResource {
                sub_id: &sub.id,
                name: &sub.name,
                time_zone: sub.time_zone.as_deref(),
            })
            .collect();
        let unselected: HashSet<String> = self
            .sub_resources
            .sync_discovered(&account, &discovered)
            .await?
            .into_iter()
            .filter(|entry| !entry.selected)
            .map(|entry| entry.sub_id)
            .collect();

        // Unselected sub-resources keep their state and records.
        let live_keys: HashSet<String> = subs
            .iter()
            .map(|sub| {
                ConnectorKey::sub_resource(source, &account.account_id, &sub.id)
                    .as_str()
                    .to_string()
            })
            .collect();
        let selected: Vec<&SubResource> = subs
            .iter()
            .filter(|sub| !unselected.contains(&sub.id))
            .collect();
        if !unselected.is_empty() {
            ctx.event(
                EventLevel::Info,
                "skipping unselected sub-resources",
                Some(json!({ "sub_resources": unselected })),
            )
            .await?;
        }

        let total = selected.len();
        let mut synced = 0u64;
        let mut deleted = 0u64;

        for (index, sub) in selected.iter().copied().enumerate() {
            if ctx.cancel.is_cancelled() {
                return Err(JobExecutionError::Interrupted("interrupted by shutdown".into()));
            }

            let key = ConnectorKey::sub_resource(source, &account.account_id, &sub.id);
            let (upserted, removed) = self
                .sync_sub_resource(ctx, adapter.as_ref(), &account, sub, &key, request.force)
                .await?;
            synced += upserted;
            deleted += removed;

            let progress = (index + 1) as f64 / total as f64;
            ctx.progress(progress, Some(&format!("synced {}", sub.name)))
                .await?;
        }

        let stale: Vec<String> = self
            .states
            .list_for_account(source, &account.account_id)
            .await?
            .into_iter()
            .map(|state| state.connector)
            .filter(|connector| !live_keys.contains(connector))
            .collect();
        if !stale.is_empty() {
            deleted += self.states.remove_connectors(&stale).await?;
            ctx.event(
                EventLevel::Info,
                "removed sub-resources no longer reported",
                Some(json!({ "connectors": stale })),
            )
            .await?;
        }

        let last_sync_at = utc_now();
        if selected.is_empty() {
            // Nothing to cursor; remember the attempt so the account is not due every tick.
            self.states
                .put(&account_key, None, Some(&last_sync_at))
                .await?;
            ctx.progress(1.0, Some("no sub-resources")).await?;
        }

        ctx.bus().broadcast(&BusEvent::ConnectorSync {
            source,
            account_id: account.account_id.clone(),
            synced_records: synced,
            timestamp: last_sync_at.clone(),
        });
        ctx.event(
            EventLevel::Info,
            &format!("{source} sync completed"),
            Some(json!({ "synced_records": synced, "deleted_records": deleted })),
        )
        .await?;

        let outcome = SyncOutcome {
            account_id: account.account_id,
            source,
            synced_records: synced,
            deleted_records: deleted,
            sub_resources: total,
            skipped_sub_resources: unselected.len(),
            last_sync_at,
        };
        serde_json::to_value(outcome).map_err(|e| JobExecutionError::Internal(e.into()))
    }

    /// Fetch and commit one sub-resource. Returns `(upserted, deleted)`.
    async fn sync_sub_resource(
        &self,
        ctx: &JobContext,
        adapter: &dyn SourceAdapter,
        account: &ConnectorAccount,
        sub: &SubResource,
        key: &ConnectorKey,
        force: bool,
    ) -> Result<(u64, u64), JobExecutionError> {
        let cursor = match self.states.get(key).await? {
            Some(state) if !force => state.cursor,
            _ => None,
        };

        let batch = match cursor {
            Some(cursor) => {
                let request = FetchRequest::Incremental { cursor };
                match adapter.fetch(account, sub, &request).await {
                    Err(AdapterError::CursorExpired) => {
                        ctx.event(
                            EventLevel::Warn,
                            &format!("cursor expired for {}, running a full sync", sub.name),
                            Some(json!({ "connector": key })),
                        )
                        .await?;
                        self.fetch_full(adapter, account, sub).await?
                    }
                    other => other?,
                }
            }
            None => self.fetch_full(adapter, account, sub).await?,
        };

        let fetched_at = utc_now();
        let commit = SyncCommit {
            connector: key,
            source: account.source,
            account_id: &account.account_id,
            records: &batch.records,
            prune_window: batch.full_window,
            cursor: batch.next_cursor.as_deref(),
            last_sync_at: &fetched_at,
        };
        let outcome = self.states.commit(&commit).await?;

        tracing::info!(
            connector = %key,
            fetched = batch.records.len(),
            upserted = outcome.upserted,
            deleted = outcome.deleted,
            full = batch.full_window.is_some(),
            "Sub-resource synced"
        );
        Ok((outcome.upserted, outcome.deleted))
    }

    async fn fetch_full(
        &self,
        adapter: &dyn SourceAdapter,
        account: &ConnectorAccount,
        sub: &SubResource,
    ) -> Result<FetchBatch, JobExecutionError> {
        let window = self.full_window(account.source, Utc::now());
        tracing::debug!(
            source = %account.source,
            sub_resource = %sub.id,
            start = %format_timestamp(window.start),
            end = %format_timestamp(window.end),
            "Full-window fetch"
        );
        Ok(adapter
            .fetch(account, sub, &FetchRequest::Full { window })
            .await?)
    }
}
