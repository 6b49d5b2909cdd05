//! SQLite-backed remote store
//!
//! Records are stored as JSON text keyed by (table, user id). Partial updates
//! are merged inside SQLite with `json_patch`, so concurrent updates to
//! disjoint fields of the same record do not overwrite each other.

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::debug;

use crate::storage::{record_user_id, Record, RemoteStore};
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct SqliteRemoteStore {
    pool: SqlitePool,
}

impl SqliteRemoteStore {
    /// Wrap a pool initialized by [`init_database`](super::init_database)
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn write_error(e: sqlx::Error) -> Error {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            Error::WriteFailed(format!("record already exists: {}", db.message()))
        }
        _ => Error::WriteFailed(e.to_string()),
    }
}

#[async_trait]
impl RemoteStore for SqliteRemoteStore {
    async fn select_one(&self, table: &str, user_id: &str) -> Result<Option<Record>> {
        let data: Option<String> =
            sqlx::query_scalar("SELECT data FROM remote_records WHERE table_name = ? AND user_id = ?")
                .bind(table)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| Error::PersistenceUnavailable(e.to_string()))?;

        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn insert_one(&self, table: &str, record: Record) -> Result<()> {
        let user_id = record_user_id(&record)?;
        let data = serde_json::to_string(&record)?;

        sqlx::query("INSERT INTO remote_records (table_name, user_id, data) VALUES (?, ?, ?)")
            .bind(table)
            .bind(&user_id)
            .bind(data)
            .execute(&self.pool)
            .await
            .map_err(write_error)?;

        debug!(table, user_id = %user_id, "Inserted remote record");
        Ok(())
    }

    async fn update_one(&self, table: &str, user_id: &str, partial: Record) -> Result<()> {
        let patch = serde_json::to_string(&partial)?;

        let result = sqlx::query(
            r#"
            UPDATE remote_records
            SET data = json_patch(data, ?), updated_at = CURRENT_TIMESTAMP
            WHERE table_name = ? AND user_id = ?
            "#,
        )
        .bind(patch)
        .bind(table)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;

        if result.rows_affected() == 0 {
            return Err(Error::WriteFailed(format!(
                "{} has no record for user {}",
                table, user_id
            )));
        }
        debug!(table, user_id, fields = partial.len(), "Updated remote record");
        Ok(())
    }
}
