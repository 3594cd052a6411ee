//! SQLite pending-change counter.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use super::ChangeCounter;

/// Error type for the SQLite counter.
#[derive(Debug, thiserror::Error)]
pub enum SqliteNotifierError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    /// The counter row is missing (schema not installed).
    #[error("Pending-change counter row missing")]
    MissingCounter,
}

/// Pending-change counter stored in SQLite, bumped by store triggers.
#[derive(Clone)]
pub struct SqliteChangeCounter {
    pool: SqlitePool,
}

impl SqliteChangeCounter {
    /// Create a counter over an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChangeCounter for SqliteChangeCounter {
    type Error = SqliteNotifierError;

    async fn pending(&self) -> Result<u64, Self::Error> {
        let row = sqlx::query("SELECT count FROM pass_pending_changes WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?
            .ok_or(SqliteNotifierError::MissingCounter)?;
        let count: i64 = row.try_get("count")?;
        Ok(count.max(0) as u64)
    }

    async fn clear(&self, consumed: u64) -> Result<(), Self::Error> {
        let consumed = i64::try_from(consumed).unwrap_or(i64::MAX);
        sqlx::query("UPDATE pass_pending_changes SET count = MAX(count - ?, 0) WHERE id = 1")
            .bind(consumed)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
