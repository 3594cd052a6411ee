//! In-memory change notifiers for testing and embedding.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{ChangeCounter, ChangeEvent, ChangeStream};

/// Error type for in-memory notifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifierError {
    /// Every emitter was dropped.
    #[error("Change channel closed")]
    Closed,
    /// Counter is marked unreachable.
    #[error("Change counter unavailable")]
    Unavailable,
}

/// Pending-change counter held in memory.
///
/// Cloning shares the counter, so a test can keep one handle to inject
/// changes while the scheduler owns another.
#[derive(Debug, Clone, Default)]
pub struct InMemoryChangeCounter {
    count: Arc<AtomicU64>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryChangeCounter {
    /// Create a counter with no pending changes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one change.
    pub fn mark_changed(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    /// Current count without going through the trait.
    pub fn current(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    /// Make reads and clears fail as if the backing store were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Release);
    }

    fn check_available(&self) -> Result<(), NotifierError> {
        if self.unavailable.load(Ordering::Acquire) {
            Err(NotifierError::Unavailable)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ChangeCounter for InMemoryChangeCounter {
    type Error = NotifierError;

    async fn pending(&self) -> Result<u64, Self::Error> {
        self.check_available()?;
        Ok(self.count.load(Ordering::Acquire))
    }

    async fn clear(&self, consumed: u64) -> Result<(), Self::Error> {
        self.check_available()?;
        // The closure never returns None, so the update always succeeds.
        let _ = self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_sub(consumed))
            });
        Ok(())
    }
}

/// Sending half of an in-memory change channel.
#[derive(Debug, Clone)]
pub struct ChangeEmitter {
    channel: String,
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

impl ChangeEmitter {
    /// Emit a change event. Returns false if the stream was dropped.
    pub fn emit(&self, payload: impl Into<String>) -> bool {
        self.tx
            .send(ChangeEvent::new(self.channel.clone(), payload))
            .is_ok()
    }
}

/// Receiving half of an in-memory change channel.
#[derive(Debug)]
pub struct ChannelChangeStream {
    rx: mpsc::UnboundedReceiver<ChangeEvent>,
}

/// Create an in-memory change channel.
///
/// Unbounded so emitters never block, mirroring a database notification
/// queue; the push scheduler does its own coalescing.
pub fn change_channel(channel: impl Into<String>) -> (ChangeEmitter, ChannelChangeStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ChangeEmitter { channel: channel.into(), tx },
        ChannelChangeStream { rx },
    )
}

#[async_trait]
impl ChangeStream for ChannelChangeStream {
    type Error = NotifierError;

    async fn recv(&mut self) -> Result<ChangeEvent, Self::Error> {
        self.rx.recv().await.ok_or(NotifierError::Closed)
    }
}
