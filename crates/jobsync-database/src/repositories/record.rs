//! Synced record repository (read side).

use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use jobsync_core::error::{AppError, ErrorKind};
use jobsync_core::result::AppResult;
use jobsync_core::types::AccountId;
use jobsync_entity::account::ConnectorSource;
use jobsync_entity::record::SyncedRecord;
use jobsync_entity::sync::ConnectorKey;

/// Filters for listing cached records.
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    pub account_id: Option<AccountId>,
    pub source: Option<ConnectorSource>,
    /// Only records ending (or starting) at or after this epoch second.
    pub start: Option<i64>,
    /// Only records starting at or before this epoch second.
    pub end: Option<i64>,
    pub limit: u32,
}

/// Read access to `synced_records`. Writes go through the sync commit.
#[derive(Debug, Clone)]
pub struct RecordRepository {
    pool: SqlitePool,
}

impl RecordRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// List records matching the filters, earliest start first.
    pub async fn query(&self, filter: &RecordQuery) -> AppResult<Vec<SyncedRecord>> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM synced_records WHERE 1 = 1");
        if let Some(account_id) = &filter.account_id {
            builder.push(" AND account_id = ").push_bind(account_id.as_str());
        }
        if let Some(source) = filter.source {
            builder.push(" AND source = ").push_bind(source.as_str());
        }
        if let Some(start) = filter.start {
            builder
                .push(" AND COALESCE(ends_ts, starts_ts) >= ")
                .push_bind(start);
        }
        if let Some(end) = filter.end {
            builder.push(" AND starts_ts <= ").push_bind(end);
        }
        builder
            .push(" ORDER BY starts_ts IS NULL, starts_ts ASC, updated_at DESC LIMIT ")
            .push_bind(i64::from(filter.limit));

        builder
            .build_query_as::<SyncedRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to query records", e))
    }

    /// All records stored under one connector key.
    pub async fn list_for_connector(&self, connector: &ConnectorKey) -> AppResult<Vec<SyncedRecord>> {
        sqlx::query_as::<_, SyncedRecord>(
            "SELECT * FROM synced_records WHERE connector = ? ORDER BY external_id",
        )
        .bind(connector.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list records", e))
    }

    /// Number of records stored under one connector key.
    pub async fn count_for_connector(&self, connector: &ConnectorKey) -> AppResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM synced_records WHERE connector = ?")
            .bind(connector.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to count records", e))
    }
}
