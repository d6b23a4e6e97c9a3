//! Sub-resource discovery and selection.

use std::collections::HashSet;

use chrono::Utc;
use sqlx::SqlitePool;

use jobsync_core::error::{AppError, ErrorKind};
use jobsync_core::result::AppResult;
use jobsync_core::types::AccountId;
use jobsync_entity::account::ConnectorAccount;
use jobsync_entity::sub_resource::{DiscoveredSubResource, SubResourceEntry};

/// Repository for `sub_resources`.
#[derive(Debug, Clone)]
pub struct SubResourceRepository {
    pool: SqlitePool,
}

fn db_err(message: &'static str) -> impl Fn(sqlx::Error) -> AppError {
    move |e| AppError::with_source(ErrorKind::Database, message, e)
}

impl SubResourceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Replace the account's sub-resources with what the provider reported.
    ///
    /// Names and time zones are refreshed, the `selected` flag of known
    /// sub-resources is kept, new ones start selected, and sub-resources
    /// no longer reported are dropped.
    pub async fn sync_discovered(
        &self,
        account: &ConnectorAccount,
        discovered: &[DiscoveredSubResource<'_>],
    ) -> AppResult<Vec<SubResourceEntry>> {
        let now = Utc::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_err("Failed to begin sub-resource transaction"))?;

        for sub in discovered {
            sqlx::query(
                "INSERT INTO sub_resources \
                 (account_id, sub_id, source, name, time_zone, selected, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, 1, ?, ?) \
                 ON CONFLICT (account_id, sub_id) DO UPDATE SET \
                 source = excluded.source, name = excluded.name, \
                 time_zone = excluded.time_zone, updated_at = excluded.updated_at",
            )
            .bind(&account.account_id)
            .bind(sub.sub_id)
            .bind(account.source)
            .bind(sub.name)
            .bind(sub.time_zone)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(db_err("Failed to upsert sub-resource"))?;
        }

        let reported: HashSet<&str> = discovered.iter().map(|sub| sub.sub_id).collect();
        let known: Vec<String> =
            sqlx::query_scalar("SELECT sub_id FROM sub_resources WHERE account_id = ?")
                .bind(&account.account_id)
                .fetch_all(&mut *tx)
                .await
                .map_err(db_err("Failed to list sub-resources"))?;
        for sub_id in known.iter().filter(|id| !reported.contains(id.as_str())) {
            sqlx::query("DELETE FROM sub_resources WHERE account_id = ? AND sub_id = ?")
                .bind(&account.account_id)
                .bind(sub_id)
                .execute(&mut *tx)
                .await
                .map_err(db_err("Failed to remove sub-resource"))?;
        }

        tx.commit()
            .await
            .map_err(db_err("Failed to commit sub-resources"))?;
        self.list_for_account(&account.account_id, false).await
    }

    /// Sub-resources of an account ordered by name.
    pub async fn list_for_account(
        &self,
        account_id: &AccountId,
        selected_only: bool,
    ) -> AppResult<Vec<SubResourceEntry>> {
        let sql = if selected_only {
            "SELECT * FROM sub_resources WHERE account_id = ? AND selected = 1 \
             ORDER BY name ASC, sub_id ASC"
        } else {
            "SELECT * FROM sub_resources WHERE account_id = ? ORDER BY name ASC, sub_id ASC"
        };
        sqlx::query_as::<_, SubResourceEntry>(sql)
            .bind(account_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err("Failed to list sub-resources"))
    }

    /// Set the selection flag. Returns `None` when the sub-resource is unknown.
    pub async fn set_selected(
        &self,
        account_id: &AccountId,
        sub_id: &str,
        selected: bool,
    ) -> AppResult<Option<SubResourceEntry>> {
        sqlx::query_as::<_, SubResourceEntry>(
            "UPDATE sub_resources SET selected = ?, updated_at = ? \
             WHERE account_id = ? AND sub_id = ? RETURNING *",
        )
        .bind(selected)
        .bind(Utc::now())
        .bind(account_id)
        .bind(sub_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("Failed to update sub-resource"))
    }
}
