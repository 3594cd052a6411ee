//! Service state.

use std::sync::Arc;

use async_trait::async_trait;

use crate::scheduler::{SchedulerMode, SchedulerStats};
use crate::store::postgres::PoolStats;
use crate::store::PostgresPassStore;

/// Database health as seen by the probes.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Whether the database answers.
    async fn is_healthy(&self) -> bool;

    /// Connection pool figures, if pooled.
    fn pool_stats(&self) -> Option<PoolStats>;
}

#[async_trait]
impl HealthProbe for PostgresPassStore {
    async fn is_healthy(&self) -> bool {
        PostgresPassStore::is_healthy(self).await
    }

    fn pool_stats(&self) -> Option<PoolStats> {
        Some(PostgresPassStore::pool_stats(self))
    }
}

/// Shared state for the ops endpoints.
pub struct ServiceState<P> {
    /// Database probe.
    pub probe: Arc<P>,
    /// Live scheduler counters.
    pub stats: Arc<SchedulerStats>,
    /// Running scheduler mode.
    pub mode: SchedulerMode,
}

impl<P: HealthProbe + 'static> ServiceState<P> {
    /// Create service state.
    pub fn new(probe: Arc<P>, stats: Arc<SchedulerStats>, mode: SchedulerMode) -> Self {
        Self { probe, stats, mode }
    }
}

impl<P> Clone for ServiceState<P> {
    fn clone(&self) -> Self {
        Self {
            probe: Arc::clone(&self.probe),
            stats: Arc::clone(&self.stats),
            mode: self.mode,
        }
    }
}
