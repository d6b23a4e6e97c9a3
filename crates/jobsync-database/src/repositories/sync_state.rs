//! Connector sync state repository.
//!
//! [`SyncStateRepository::commit`] applies one fetched batch and advances
//! the cursor inside a single transaction. If any statement fails nothing
//! is written, so the stored cursor always matches the stored records.

use std::collections::HashSet;

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool, Transaction};

use jobsync_core::error::{AppError, ErrorKind};
use jobsync_core::result::AppResult;
use jobsync_core::types::AccountId;
use jobsync_entity::account::ConnectorSource;
use jobsync_entity::record::RemoteRecord;
use jobsync_entity::sync::{ConnectorKey, ConnectorSyncState, SyncWindow};

/// Maximum ids bound into a single `IN (...)` delete.
const DELETE_CHUNK: usize = 200;

/// One sub-resource's fetched batch, ready to be reconciled.
#[derive(Debug, Clone)]
pub struct SyncCommit<'a> {
    pub connector: &'a ConnectorKey,
    pub source: ConnectorSource,
    pub account_id: &'a AccountId,
    pub records: &'a [RemoteRecord],
    /// Set after a full-window fetch: stored records starting inside the
    /// window but missing from the batch are deleted.
    pub prune_window: Option<SyncWindow>,
    pub cursor: Option<&'a str>,
    pub last_sync_at: &'a str,
}

/// Row counts produced by a commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitOutcome {
    pub upserted: u64,
    pub deleted: u64,
}

/// Repository for `sync_state` and the reconcile transaction.
#[derive(Debug, Clone)]
pub struct SyncStateRepository {
    pool: SqlitePool,
}

fn db_err(message: &'static str) -> impl Fn(sqlx::Error) -> AppError {
    move |e| AppError::with_source(ErrorKind::Database, message, e)
}

impl SyncStateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Load the state for one connector key.
    pub async fn get(&self, connector: &ConnectorKey) -> AppResult<Option<ConnectorSyncState>> {
        sqlx::query_as::<_, ConnectorSyncState>("SELECT * FROM sync_state WHERE connector = ?")
            .bind(connector.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("Failed to load sync state"))
    }

    /// All sub-resource states of an account.
    pub async fn list_for_account(
        &self,
        source: ConnectorSource,
        account_id: &AccountId,
    ) -> AppResult<Vec<ConnectorSyncState>> {
        let prefix = ConnectorKey::sub_resource_prefix(source, account_id);
        sqlx::query_as::<_, ConnectorSyncState>(
            "SELECT * FROM sync_state WHERE substr(connector, 1, length(?)) = ? ORDER BY connector",
        )
        .bind(&prefix)
        .bind(&prefix)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to list sync state"))
    }

    /// Write a state row directly, outside of a sync.
    pub async fn put(
        &self,
        connector: &ConnectorKey,
        cursor: Option<&str>,
        last_sync_at: Option<&str>,
    ) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO sync_state (connector, cursor, last_sync_at) VALUES (?, ?, ?) \
             ON CONFLICT (connector) DO UPDATE SET \
             cursor = excluded.cursor, last_sync_at = excluded.last_sync_at",
        )
        .bind(connector.as_str())
        .bind(cursor)
        .bind(last_sync_at)
        .execute(&self.pool)
        .await
        .map_err(db_err("Failed to write sync state"))?;
        Ok(())
    }

    /// Reconcile a batch and advance the cursor atomically.
    pub async fn commit(&self, batch: &SyncCommit<'_>) -> AppResult<CommitOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_err("Failed to begin sync transaction"))?;
        let mut outcome = CommitOutcome::default();

        for record in batch.records {
            if record.removed {
                let result =
                    sqlx::query("DELETE FROM synced_records WHERE connector = ? AND external_id = ?")
                        .bind(batch.connector.as_str())
                        .bind(&record.external_id)
                        .execute(&mut *tx)
                        .await
                        .map_err(db_err("Failed to delete removed record"))?;
                outcome.deleted += result.rows_affected();
            } else {
                upsert_record(&mut tx, batch, record).await?;
                outcome.upserted += 1;
            }
        }

        if let Some(window) = batch.prune_window {
            outcome.deleted += prune_window(&mut tx, batch, window).await?;
        }

        sqlx::query(
            "INSERT INTO sync_state (connector, cursor, last_sync_at) VALUES (?, ?, ?) \
             ON CONFLICT (connector) DO UPDATE SET \
             cursor = excluded.cursor, last_sync_at = excluded.last_sync_at",
        )
        .bind(batch.connector.as_str())
        .bind(batch.cursor)
        .bind(batch.last_sync_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err("Failed to advance sync cursor"))?;

        tx.commit()
            .await
            .map_err(db_err("Failed to commit sync transaction"))?;
        Ok(outcome)
    }

    /// Remove the records and state rows of sub-resources that no longer exist.
    pub async fn remove_connectors(&self, connectors: &[String]) -> AppResult<u64> {
        if connectors.is_empty() {
            return Ok(0);
        }
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_err("Failed to begin prune transaction"))?;
        let mut deleted = 0;
        for connector in connectors {
            let result = sqlx::query("DELETE FROM synced_records WHERE connector = ?")
                .bind(connector)
                .execute(&mut *tx)
                .await
                .map_err(db_err("Failed to prune sub-resource records"))?;
            deleted += result.rows_affected();
            sqlx::query("DELETE FROM sync_state WHERE connector = ?")
                .bind(connector)
                .execute(&mut *tx)
                .await
                .map_err(db_err("Failed to prune sub-resource state"))?;
        }
        tx.commit()
            .await
            .map_err(db_err("Failed to commit prune transaction"))?;
        Ok(deleted)
    }
}

async fn upsert_record(
    tx: &mut Transaction<'_, Sqlite>,
    batch: &SyncCommit<'_>,
    record: &RemoteRecord,
) -> AppResult<()> {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO synced_records \
         (connector, external_id, source, account_id, record_type, title, description, url, \
          actor, status, starts_ts, ends_ts, data, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT (connector, external_id) DO UPDATE SET \
         record_type = excluded.record_type, title = excluded.title, \
         description = excluded.description, url = excluded.url, actor = excluded.actor, \
         status = excluded.status, starts_ts = excluded.starts_ts, ends_ts = excluded.ends_ts, \
         data = excluded.data, updated_at = excluded.updated_at",
    )
    .bind(batch.connector.as_str())
    .bind(&record.external_id)
    .bind(batch.source)
    .bind(batch.account_id)
    .bind(&record.record_type)
    .bind(&record.title)
    .bind(&record.description)
    .bind(&record.url)
    .bind(&record.actor)
    .bind(&record.status)
    .bind(record.starts_ts())
    .bind(record.ends_ts())
    .bind(&record.data)
    .bind(now)
    .bind(now)
    .execute(&mut **tx)
    .await
    .map_err(db_err("Failed to upsert record"))?;
    Ok(())
}

async fn prune_window(
    tx: &mut Transaction<'_, Sqlite>,
    batch: &SyncCommit<'_>,
    window: SyncWindow,
) -> AppResult<u64> {
    let stored: Vec<String> = sqlx::query_scalar(
        "SELECT external_id FROM synced_records \
         WHERE connector = ? AND starts_ts IS NOT NULL AND starts_ts >= ? AND starts_ts <= ?",
    )
    .bind(batch.connector.as_str())
    .bind(window.start_ts())
    .bind(window.end_ts())
    .fetch_all(&mut **tx)
    .await
    .map_err(db_err("Failed to list records in window"))?;

    let seen: HashSet<&str> = batch
        .records
        .iter()
        .filter(|r| !r.removed)
        .map(|r| r.external_id.as_str())
        .collect();
    let stale: Vec<&String> = stored
        .iter()
        .filter(|id| !seen.contains(id.as_str()))
        .collect();

    let mut deleted = 0;
    for chunk in stale.chunks(DELETE_CHUNK) {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("DELETE FROM synced_records WHERE connector = ");
        builder.push_bind(batch.connector.as_str());
        builder.push(" AND external_id IN (");
        let mut ids = builder.separated(", ");
        for id in chunk {
            ids.push_bind(id.as_str());
        }
        ids.push_unseparated(")");
        let result = builder
            .build()
            .execute(&mut **tx)
            .await
            .map_err(db_err("Failed to prune stale records"))?;
        deleted += result.rows_affected();
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::DatabasePool;
    use crate::migration::run_migrations;
    use crate::repositories::RecordRepository;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    async fn repos() -> (SyncStateRepository, RecordRepository) {
        let db = DatabasePool::connect_in_memory().await.unwrap();
        run_migrations(db.pool()).await.unwrap();
        (
            SyncStateRepository::new(db.pool().clone()),
            RecordRepository::new(db.pool().clone()),
        )
    }

    fn event(id: &str, start: Option<i64>) -> RemoteRecord {
        let mut record = RemoteRecord::new(id, "event", format!("Event {id}"));
        record.starts_at = start.map(|s| Utc.timestamp_opt(s, 0).unwrap());
        record.data = json!({"id": id});
        record
    }

    #[tokio::test]
    async fn test_commit_is_idempotent() {
        let (state, records) = repos().await;
        let acct = AccountId::from_string("acct_1");
        let key = ConnectorKey::sub_resource(ConnectorSource::Calendar, &acct, "primary");
        let batch = vec![event("a", Some(1_000)), event("b", None)];
        let commit = SyncCommit {
            connector: &key,
            source: ConnectorSource::Calendar,
            account_id: &acct,
            records: &batch,
            prune_window: None,
            cursor: Some("tok-1"),
            last_sync_at: "2024-05-01T00:00:00Z",
        };

        state.commit(&commit).await.unwrap();
        let outcome = state.commit(&commit).await.unwrap();
        assert_eq!(outcome, CommitOutcome { upserted: 2, deleted: 0 });
        assert_eq!(records.count_for_connector(&key).await.unwrap(), 2);

        let saved = state.get(&key).await.unwrap().unwrap();
        assert_eq!(saved.cursor.as_deref(), Some("tok-1"));
        assert_eq!(saved.last_sync_at.as_deref(), Some("2024-05-01T00:00:00Z"));
    }

    #[tokio::test]
    async fn test_removed_and_window_pruning() {
        let (state, records) = repos().await;
        let acct = AccountId::from_string("acct_1");
        let key = ConnectorKey::sub_resource(ConnectorSource::Calendar, &acct, "primary");
        let now = Utc::now();
        let inside = now.timestamp();
        let outside = (now - Duration::days(60)).timestamp();

        let initial = vec![
            event("keep", Some(inside)),
            event("stale", Some(inside)),
            event("old", Some(outside)),
            event("undated", None),
            event("cancelled", Some(inside)),
        ];
        let mut commit = SyncCommit {
            connector: &key,
            source: ConnectorSource::Calendar,
            account_id: &acct,
            records: &initial,
            prune_window: None,
            cursor: None,
            last_sync_at: "2024-05-01T00:00:00Z",
        };
        state.commit(&commit).await.unwrap();

        let second = vec![event("keep", Some(inside)), RemoteRecord::removed("cancelled")];
        commit.records = &second;
        commit.prune_window = Some(SyncWindow::around(now, 30, 90));
        let outcome = state.commit(&commit).await.unwrap();
        assert_eq!(outcome.upserted, 1);
        assert_eq!(outcome.deleted, 2);

        let mut ids: Vec<String> = records
            .list_for_connector(&key)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.external_id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["keep", "old", "undated"]);
    }

    #[tokio::test]
    async fn test_remove_connectors_and_list_for_account() {
        let (state, records) = repos().await;
        let acct = AccountId::from_string("acct_1");
        let a = ConnectorKey::sub_resource(ConnectorSource::Calendar, &acct, "a");
        let b = ConnectorKey::sub_resource(ConnectorSource::Calendar, &acct, "b");
        for key in [&a, &b] {
            let batch = vec![event("x", Some(1))];
            state
                .commit(&SyncCommit {
                    connector: key,
                    source: ConnectorSource::Calendar,
                    account_id: &acct,
                    records: &batch,
                    prune_window: None,
                    cursor: Some("c"),
                    last_sync_at: "2024-05-01T00:00:00Z",
                })
                .await
                .unwrap();
        }
        state
            .put(&ConnectorKey::sub_resource(ConnectorSource::Jira, &acct, "activity"), None, None)
            .await
            .unwrap();

        let listed = state
            .list_for_account(ConnectorSource::Calendar, &acct)
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);

        let deleted = state.remove_connectors(&[b.to_string()]).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(state.get(&b).await.unwrap().is_none());
        assert_eq!(records.count_for_connector(&a).await.unwrap(), 1);
    }
}
