//! Change notifiers.
//!
//! The schedulers learn that stations or element sets changed in one of two
//! ways:
//!
//! - [`ChangeCounter`]: a pending-change count that the polling scheduler
//!   reads before and after each cycle
//! - [`ChangeStream`]: a process-lifetime subscription delivering discrete
//!   [`ChangeEvent`]s to the push scheduler

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Polling-mode pending-change marker.
#[async_trait]
pub trait ChangeCounter: Send + Sync {
    /// Error type for counter operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Number of changes not yet covered by a completed cycle.
    async fn pending(&self) -> Result<u64, Self::Error>;

    /// Remove `consumed` markers, saturating at zero.
    ///
    /// Markers recorded after the caller's last read are kept, so a change
    /// landing between the read and the clear is not lost.
    async fn clear(&self, consumed: u64) -> Result<(), Self::Error>;
}

/// Push-mode subscription to change events.
#[async_trait]
pub trait ChangeStream: Send {
    /// Error type for receive failures.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Wait for the next change event.
    ///
    /// An error means the subscription is gone; the scheduler treats it as
    /// fatal.
    async fn recv(&mut self) -> Result<ChangeEvent, Self::Error>;
}

/// A discrete change notification.
///
/// The payload is opaque; the scheduler only uses the event as a trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Channel the event arrived on.
    pub channel: String,
    /// Opaque payload (the Postgres trigger sends the changed table name).
    pub payload: String,
    /// When the event was received.
    pub received_at: DateTime<Utc>,
}

impl ChangeEvent {
    /// Create an event received now.
    pub fn new(channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
            received_at: Utc::now(),
        }
    }
}

pub use memory::{change_channel, ChangeEmitter, ChannelChangeStream, InMemoryChangeCounter, NotifierError};

#[cfg(feature = "postgres")]
pub use postgres::{PgChangeStream, PostgresChangeCounter, RECONNECTED_PAYLOAD};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteChangeCounter;
