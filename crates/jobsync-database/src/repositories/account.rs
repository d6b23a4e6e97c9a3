//! Connector account repository.

use chrono::Utc;
use sqlx::SqlitePool;

use jobsync_core::error::{AppError, ErrorKind};
use jobsync_core::result::AppResult;
use jobsync_core::types::AccountId;
use jobsync_entity::account::{ConnectorAccount, ConnectorSource, CreateAccount};
use jobsync_entity::sync::ConnectorKey;

/// Repository for registered connector accounts.
#[derive(Debug, Clone)]
pub struct AccountRepository {
    pool: SqlitePool,
}

impl AccountRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a new account.
    pub async fn create(&self, data: &CreateAccount) -> AppResult<ConnectorAccount> {
        let now = Utc::now();
        sqlx::query_as::<_, ConnectorAccount>(
            "INSERT INTO connector_accounts \
             (account_id, source, display_name, settings, credentials, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(AccountId::new())
        .bind(data.source)
        .bind(&data.display_name)
        .bind(&data.settings)
        .bind(&data.credentials)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to create account", e))
    }

    /// Find an account by ID.
    pub async fn find_by_id(&self, id: &AccountId) -> AppResult<Option<ConnectorAccount>> {
        sqlx::query_as::<_, ConnectorAccount>(
            "SELECT * FROM connector_accounts WHERE account_id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find account", e))
    }

    /// List accounts, optionally restricted to one source, oldest first.
    pub async fn list(&self, source: Option<ConnectorSource>) -> AppResult<Vec<ConnectorAccount>> {
        let query = match source {
            Some(source) => sqlx::query_as::<_, ConnectorAccount>(
                "SELECT * FROM connector_accounts WHERE source = ? ORDER BY created_at ASC, rowid ASC",
            )
            .bind(source),
            None => sqlx::query_as::<_, ConnectorAccount>(
                "SELECT * FROM connector_accounts ORDER BY created_at ASC, rowid ASC",
            ),
        };
        query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list accounts", e))
    }

    /// Delete an account with its records, sub-resources, and sync state.
    ///
    /// Returns `false` when the account does not exist.
    pub async fn delete(&self, account: &ConnectorAccount) -> AppResult<bool> {
        let db_err = |e: sqlx::Error| {
            AppError::with_source(ErrorKind::Database, "Failed to delete account", e)
        };
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query("DELETE FROM synced_records WHERE account_id = ?")
            .bind(&account.account_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        sqlx::query("DELETE FROM sub_resources WHERE account_id = ?")
            .bind(&account.account_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        let key = ConnectorKey::account(account.source, &account.account_id);
        let prefix = ConnectorKey::sub_resource_prefix(account.source, &account.account_id);
        sqlx::query(
            "DELETE FROM sync_state WHERE connector = ? \
             OR substr(connector, 1, length(?)) = ?",
        )
        .bind(key.as_str())
        .bind(&prefix)
        .bind(&prefix)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let removed = sqlx::query("DELETE FROM connector_accounts WHERE account_id = ?")
            .bind(&account.account_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(removed.rows_affected() == 1)
    }
}
