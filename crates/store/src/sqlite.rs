//! SQLite-backed credential store using sqlx.
//!
//! Schema: `credentials(workspace_id, credential_key, access_token, expires_at,
//! record_json, created_at, updated_at)` with composite primary key
//! `(workspace_id, credential_key)`. Only the `"bot"` credential key is
//! written, so each workspace holds exactly one row.

use async_trait::async_trait;
use chatvault_types::{CredentialRecord, CredentialStore, WorkspaceId, traits::Result};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::str::FromStr;

/// Secondary key of the single credential row kept per workspace.
const CREDENTIAL_KEY: &str = "bot";

/// A persistent [`CredentialStore`] backed by `SQLite`.
pub struct SqliteCredentialStore {
    pool: SqlitePool,
}

impl SqliteCredentialStore {
    /// Connects to a `SQLite` database (e.g. `"sqlite:./credentials.db"` or `"sqlite::memory:"`).
    ///
    /// Creates the database file if it does not exist and runs migrations.
    ///
    /// # Errors
    ///
    /// Returns a [`sqlx::Error`] if the connection or table creation fails.
    pub async fn new(database_url: &str) -> std::result::Result<Self, sqlx::Error> {
        // Every connection to `:memory:` opens its own database.
        let max_connections = if database_url.contains(":memory:") {
            1
        } else {
            5
        };
        let opts = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    async fn migrate(pool: &SqlitePool) -> std::result::Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS credentials (
                workspace_id    TEXT    NOT NULL,
                credential_key  TEXT    NOT NULL,
                access_token    TEXT    NOT NULL,
                expires_at      INTEGER,
                record_json     TEXT    NOT NULL,
                created_at      INTEGER NOT NULL DEFAULT (unixepoch()),
                updated_at      INTEGER NOT NULL DEFAULT (unixepoch()),
                PRIMARY KEY (workspace_id, credential_key)
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_credentials_expires_at
             ON credentials(expires_at)",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Overwrites the existing row in place. Returns `false` if there was none.
    async fn update_existing(&self, record: &CredentialRecord, json: &str) -> Result<bool> {
        let done = sqlx::query(
            "UPDATE credentials
             SET access_token = ?, expires_at = ?, record_json = ?, updated_at = unixepoch()
             WHERE workspace_id = ? AND credential_key = ?",
        )
        .bind(&record.access_token)
        .bind(expires_at_column(record))
        .bind(json)
        .bind(record.workspace_id.as_str())
        .bind(CREDENTIAL_KEY)
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected() > 0)
    }

    /// Writes the row regardless of what is stored.
    async fn insert_or_replace(&self, record: &CredentialRecord, json: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO credentials (workspace_id, credential_key, access_token, expires_at, record_json)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(workspace_id, credential_key) DO UPDATE SET
                 access_token = excluded.access_token,
                 expires_at = excluded.expires_at,
                 record_json = excluded.record_json,
                 updated_at = unixepoch()",
        )
        .bind(record.workspace_id.as_str())
        .bind(CREDENTIAL_KEY)
        .bind(&record.access_token)
        .bind(expires_at_column(record))
        .bind(json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn expires_at_column(record: &CredentialRecord) -> Option<i64> {
    record
        .expires_at
        .map(|ts| i64::try_from(ts).unwrap_or(i64::MAX))
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn get_latest(&self, workspace: &WorkspaceId) -> Result<Option<CredentialRecord>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT record_json FROM credentials WHERE workspace_id = ? AND credential_key = ?",
        )
        .bind(workspace.as_str())
        .bind(CREDENTIAL_KEY)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            None => Ok(None),
            Some((json,)) => Ok(Some(serde_json::from_str(&json)?)),
        }
    }

    /// Conditional update first, then an unconditional upsert when no row
    /// existed yet.
    async fn put(&self, record: &CredentialRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        if self.update_existing(record, &json).await? {
            return Ok(());
        }
        tracing::debug!(workspace = %record.workspace_id, "no stored credential, inserting");
        self.insert_or_replace(record, &json).await
    }

    async fn delete(&self, workspace: &WorkspaceId) -> Result<()> {
        sqlx::query("DELETE FROM credentials WHERE workspace_id = ? AND credential_key = ?")
            .bind(workspace.as_str())
            .bind(CREDENTIAL_KEY)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_if_unchanged(
        &self,
        workspace: &WorkspaceId,
        access_token: &str,
    ) -> Result<bool> {
        let done = sqlx::query(
            "DELETE FROM credentials
             WHERE workspace_id = ? AND credential_key = ? AND access_token = ?",
        )
        .bind(workspace.as_str())
        .bind(CREDENTIAL_KEY)
        .bind(access_token)
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected() > 0)
    }
}
