//! PostgreSQL change notifiers.
//!
//! - [`PostgresChangeCounter`] reads and clears the `pass_pending_changes`
//!   row bumped by the store triggers.
//! - [`PgChangeStream`] holds a dedicated `LISTEN` connection, separate from
//!   the pool the worker reads and writes through. After the connection is
//!   lost and re-established it yields one [`RECONNECTED_PAYLOAD`] event,
//!   since notifications sent in between are gone.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgListener, PgPool};
use sqlx::Row;

use super::{ChangeCounter, ChangeEvent, ChangeStream};

/// Payload of the event yielded after the `LISTEN` connection was re-established.
pub const RECONNECTED_PAYLOAD: &str = "reconnected";

/// Error type for PostgreSQL notifiers.
#[derive(Debug, thiserror::Error)]
pub enum PgNotifierError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    /// The counter row is missing (schema not installed).
    #[error("Pending-change counter row missing")]
    MissingCounter,
}

/// Pending-change counter stored in PostgreSQL.
#[derive(Clone)]
pub struct PostgresChangeCounter {
    pool: PgPool,
}

impl PostgresChangeCounter {
    /// Create a counter over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChangeCounter for PostgresChangeCounter {
    type Error = PgNotifierError;

    async fn pending(&self) -> Result<u64, Self::Error> {
        let row = sqlx::query("SELECT count FROM pass_pending_changes WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?
            .ok_or(PgNotifierError::MissingCounter)?;
        let count: i64 = row.try_get("count")?;
        Ok(count.max(0) as u64)
    }

    async fn clear(&self, consumed: u64) -> Result<(), Self::Error> {
        let consumed = i64::try_from(consumed).unwrap_or(i64::MAX);
        sqlx::query(
            "UPDATE pass_pending_changes SET count = GREATEST(count - $1, 0) WHERE id = 1",
        )
        .bind(consumed)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// `LISTEN` subscription on one channel.
pub struct PgChangeStream {
    listener: PgListener,
    channel: String,
}

impl PgChangeStream {
    /// Open a dedicated connection and subscribe to `channel`.
    pub async fn connect(database_url: &str, channel: &str) -> Result<Self, PgNotifierError> {
        let mut listener = PgListener::connect(database_url).await?;
        listener.listen(channel).await?;
        tracing::info!(channel = channel, "Subscribed to change notifications");
        Ok(Self {
            listener,
            channel: channel.to_string(),
        })
    }

    /// Channel this stream listens on.
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

#[async_trait]
impl ChangeStream for PgChangeStream {
    type Error = PgNotifierError;

    async fn recv(&mut self) -> Result<ChangeEvent, Self::Error> {
        // `try_recv` reports a lost connection as `None`; the next call
        // reconnects and re-subscribes.
        let event = match self.listener.try_recv().await? {
            Some(notification) => ChangeEvent {
                channel: notification.channel().to_string(),
                payload: notification.payload().to_string(),
                received_at: Utc::now(),
            },
            None => {
                tracing::warn!(
                    channel = %self.channel,
                    "LISTEN connection lost, treating as a change"
                );
                reconnect_event(&self.channel)
            }
        };
        Ok(event)
    }
}

fn reconnect_event(channel: &str) -> ChangeEvent {
    ChangeEvent::new(channel, RECONNECTED_PAYLOAD)
}
