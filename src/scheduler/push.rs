//! Push / single-worker-in-flight scheduler.
//!
//! ## Structure
//!
//! ```text
//! ChangeStream ──► listener ──try_send──► [slot: capacity 1] ──► worker
//!                                   │                            │
//!                        full: coalesced            guard → debounce → cycle
//! ```
//!
//! - The listener never blocks on the worker. A full slot means a cycle is
//!   already pending, so the event is absorbed.
//! - The worker holds the [`WorkerGuard`] for the debounce delay and the
//!   cycle, so at most one cycle is in flight.
//! - Tokens that arrive during the delay are drained before the cycle reads
//!   its snapshot. Tokens that arrive after that stay in the slot and cause
//!   exactly one follow-up cycle.
//! - Each cycle runs in its own task. A panic or error is logged and the
//!   worker keeps serving.
//! - The slot starts with one token, so a catch-up cycle runs at startup
//!   even if no event ever arrives. Changes made while no scheduler was
//!   listening, and work left by a failed cycle of a previous run, are
//!   picked up by it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::{CycleRunner, SchedulerError, SchedulerMode, SchedulerStats, WorkerGuard};
use crate::metrics::{CycleMetrics, NoOpMetrics, EVENTS_COALESCED_TOTAL};
use crate::notifier::ChangeStream;

/// Event-driven scheduler with debounce and coalescing.
pub struct PushScheduler<R> {
    runner: Arc<R>,
    debounce: Duration,
    guard: WorkerGuard,
    stats: Arc<SchedulerStats>,
    metrics: Arc<dyn CycleMetrics>,
}

impl<R> PushScheduler<R>
where
    R: CycleRunner + 'static,
{
    /// Create a scheduler waiting `debounce` before each cycle.
    pub fn new(runner: Arc<R>, debounce: Duration) -> Self {
        Self {
            runner,
            debounce,
            guard: WorkerGuard::new(),
            stats: Arc::new(SchedulerStats::new()),
            metrics: Arc::new(NoOpMetrics),
        }
    }

    /// Use a metrics handle.
    pub fn with_metrics(mut self, metrics: Arc<dyn CycleMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Use shared stats.
    pub fn with_stats(mut self, stats: Arc<SchedulerStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Live counters.
    pub fn stats(&self) -> Arc<SchedulerStats> {
        Arc::clone(&self.stats)
    }

    /// Handle on the exclusivity guard.
    pub fn guard(&self) -> WorkerGuard {
        self.guard.clone()
    }

    /// Debounce delay.
    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Serve `stream` until it fails.
    pub async fn run<S>(self, stream: S) -> Result<(), SchedulerError>
    where
        S: ChangeStream,
    {
        self.run_until(stream, std::future::pending()).await
    }

    /// Serve `stream` until it fails or `shutdown` resolves.
    ///
    /// One catch-up cycle is queued before the first event is read.
    ///
    /// On either, the listener stops, the slot is closed, and this waits for
    /// the worker to finish what is already queued.
    pub async fn run_until<S, F>(self, mut stream: S, shutdown: F) -> Result<(), SchedulerError>
    where
        S: ChangeStream,
        F: Future<Output = ()>,
    {
        let (slot_tx, slot_rx) = mpsc::channel::<()>(1);
        if slot_tx.try_send(()).is_err() {
            return Err(SchedulerError::WorkerStopped);
        }

        let worker = tokio::spawn(worker_loop(
            Arc::clone(&self.runner),
            slot_rx,
            self.debounce,
            self.guard.clone(),
            Arc::clone(&self.stats),
            Arc::clone(&self.metrics),
        ));

        tracing::info!(
            debounce_ms = self.debounce.as_millis() as u64,
            "Push scheduler started, catch-up cycle queued"
        );
        tokio::pin!(shutdown);

        let outcome = loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("Push scheduler stopping");
                    break Ok(());
                }
                received = stream.recv() => match received {
                    Ok(event) => {
                        self.stats.event_received();
                        match slot_tx.try_send(()) {
                            Ok(()) => {
                                tracing::debug!(payload = %event.payload, "Cycle queued");
                            }
                            Err(TrySendError::Full(())) => {
                                self.stats.event_coalesced();
                                self.metrics.increment(EVENTS_COALESCED_TOTAL, 1, &[]);
                                tracing::debug!(payload = %event.payload, "Change absorbed by pending cycle");
                            }
                            Err(TrySendError::Closed(())) => {
                                tracing::error!("Push worker gone");
                                break Err(SchedulerError::WorkerStopped);
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Change stream failed");
                        break Err(SchedulerError::from_notifier(e));
                    }
                },
            }
        };

        drop(slot_tx);
        if let Err(e) = worker.await {
            tracing::error!(error = %e, "Push worker task failed");
            if outcome.is_ok() {
                return Err(SchedulerError::WorkerStopped);
            }
        }
        outcome
    }
}

async fn worker_loop<R>(
    runner: Arc<R>,
    mut slot: mpsc::Receiver<()>,
    debounce: Duration,
    guard: WorkerGuard,
    stats: Arc<SchedulerStats>,
    metrics: Arc<dyn CycleMetrics>,
) where
    R: CycleRunner + 'static,
{
    let mode = SchedulerMode::Push.as_str();

    while slot.recv().await.is_some() {
        let Some(_permit) = guard.acquire().await else {
            tracing::error!("Worker guard closed");
            break;
        };

        tokio::time::sleep(debounce).await;
        while slot.try_recv().is_ok() {
            stats.event_coalesced();
            metrics.increment(EVENTS_COALESCED_TOTAL, 1, &[]);
        }

        stats.cycle_started();
        let cycle = tokio::spawn({
            let runner = Arc::clone(&runner);
            async move { runner.run_cycle().await }
        });

        match cycle.await {
            Ok(Ok(report)) => {
                stats.cycle_succeeded(&report);
                metrics.record_cycle(mode, &report);
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Cycle failed, waiting for next change");
                stats.cycle_failed(e.to_string());
                metrics.record_cycle_failure(mode);
            }
            Err(e) => {
                tracing::error!(error = %e, "Cycle task panicked, waiting for next change");
                stats.cycle_failed(e.to_string());
                metrics.record_cycle_failure(mode);
            }
        }
    }

    tracing::debug!("Push worker exiting");
}
