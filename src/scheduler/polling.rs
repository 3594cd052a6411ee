//! Polling / convergence-loop scheduler.
//!
//! Each iteration:
//!
//! 1. Target wake = now + period
//! 2. Read the pending count N
//! 3. If N > 0, run a cycle
//! 4. Re-read the count N'
//! 5. N' > N: a change landed mid-cycle, so loop again immediately
//! 6. Otherwise clear the N consumed markers and sleep until the target wake
//!
//! The loop never sleeps while a change is unresolved, and a failed cycle
//! leaves the markers untouched.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::{CycleRunner, SchedulerError, SchedulerMode, SchedulerStats};
use crate::metrics::{CycleMetrics, NoOpMetrics, STALE_CYCLES_TOTAL};
use crate::notifier::ChangeCounter;
use crate::worker::CycleReport;

/// What one iteration did.
#[derive(Debug, Clone, PartialEq)]
pub enum IterationOutcome {
    /// Nothing pending; no cycle ran.
    Idle,
    /// A cycle ran and no change landed meanwhile; markers cleared.
    Converged {
        /// Markers consumed by the cycle.
        consumed: u64,
        /// Cycle summary.
        report: CycleReport,
    },
    /// A change landed while the cycle ran; markers kept.
    Stale {
        /// Count before the cycle.
        before: u64,
        /// Count after the cycle.
        after: u64,
        /// Cycle summary.
        report: CycleReport,
    },
}

/// Result of one iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct Iteration {
    /// What happened.
    pub outcome: IterationOutcome,
    /// How long to wait before the next iteration.
    pub next_delay: Duration,
}

/// Fixed-period polling scheduler.
pub struct PollingScheduler<R, C> {
    runner: Arc<R>,
    counter: Arc<C>,
    period: Duration,
    stats: Arc<SchedulerStats>,
    metrics: Arc<dyn CycleMetrics>,
}

impl<R, C> PollingScheduler<R, C>
where
    R: CycleRunner,
    C: ChangeCounter,
{
    /// Create a scheduler polling every `period`.
    pub fn new(runner: Arc<R>, counter: Arc<C>, period: Duration) -> Self {
        Self {
            runner,
            counter,
            period,
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

    /// Polling period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Run one iteration.
    pub async fn run_iteration(&self) -> Result<Iteration, SchedulerError> {
        let wake_at = Instant::now() + self.period;

        let before = self
            .counter
            .pending()
            .await
            .map_err(SchedulerError::from_notifier)?;

        if before == 0 {
            tracing::debug!("No pending changes");
            return Ok(Iteration {
                outcome: IterationOutcome::Idle,
                next_delay: wake_at.saturating_duration_since(Instant::now()),
            });
        }

        tracing::info!(pending = before, "Pending changes, running cycle");
        self.stats.cycle_started();
        let report = match self.runner.run_cycle().await {
            Ok(report) => report,
            Err(e) => {
                self.stats.cycle_failed(e.to_string());
                self.metrics.record_cycle_failure(SchedulerMode::Poll.as_str());
                return Err(e.into());
            }
        };
        self.stats.cycle_succeeded(&report);
        self.metrics.record_cycle(SchedulerMode::Poll.as_str(), &report);

        let after = self
            .counter
            .pending()
            .await
            .map_err(SchedulerError::from_notifier)?;

        if after > before {
            tracing::warn!(
                cycle_id = %report.cycle_id,
                before = before,
                after = after,
                "Inputs changed during cycle, recomputing immediately"
            );
            self.stats.stale_cycle();
            self.metrics.increment(STALE_CYCLES_TOTAL, 1, &[]);
            return Ok(Iteration {
                outcome: IterationOutcome::Stale {
                    before,
                    after,
                    report,
                },
                next_delay: Duration::ZERO,
            });
        }

        self.counter
            .clear(before)
            .await
            .map_err(SchedulerError::from_notifier)?;

        Ok(Iteration {
            outcome: IterationOutcome::Converged {
                consumed: before,
                report,
            },
            next_delay: wake_at.saturating_duration_since(Instant::now()),
        })
    }

    /// Run until an iteration fails.
    pub async fn run(&self) -> Result<(), SchedulerError> {
        self.run_until(std::future::pending()).await
    }

    /// Run until `shutdown` resolves or an iteration fails.
    ///
    /// Shutdown is only observed between iterations; a running cycle is
    /// never cut short.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<(), SchedulerError>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(period_secs = self.period.as_secs_f64(), "Polling scheduler started");
        tokio::pin!(shutdown);

        loop {
            let iteration = self.run_iteration().await?;

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("Polling scheduler stopping");
                    return Ok(());
                }
                _ = tokio::time::sleep(iteration.next_delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{TestMetrics, CYCLES_TOTAL};
    use crate::notifier::InMemoryChangeCounter;
    use crate::scheduler::testing::{report, FakeRunner, Step};
    use crate::worker::CycleError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Runner that records a new change during its first `changes` cycles.
    struct ChangingRunner {
        counter: InMemoryChangeCounter,
        changes: usize,
        runs: AtomicUsize,
    }

    #[async_trait]
    impl CycleRunner for ChangingRunner {
        async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
            let run = self.runs.fetch_add(1, Ordering::SeqCst);
            if run < self.changes {
                self.counter.mark_changed();
            }
            Ok(report(0))
        }
    }

    const PERIOD: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn test_idle_sleeps_full_period() {
        let counter = Arc::new(InMemoryChangeCounter::new());
        let runner = Arc::new(FakeRunner::new(Duration::ZERO));
        let scheduler = PollingScheduler::new(runner.clone(), counter, PERIOD);

        let iteration = scheduler.run_iteration().await.unwrap();
        assert_eq!(iteration.outcome, IterationOutcome::Idle);
        assert_eq!(iteration.next_delay, PERIOD);
        assert_eq!(runner.started(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_converged_clears_and_sleeps_remainder() {
        let counter = Arc::new(InMemoryChangeCounter::new());
        counter.mark_changed();
        counter.mark_changed();
        let runner = Arc::new(FakeRunner::new(Duration::from_secs(10)));
        let scheduler = PollingScheduler::new(runner, counter.clone(), PERIOD);

        let iteration = scheduler.run_iteration().await.unwrap();
        assert!(matches!(
            iteration.outcome,
            IterationOutcome::Converged { consumed: 2, .. }
        ));
        assert_eq!(iteration.next_delay, Duration::from_secs(50));
        assert_eq!(counter.current(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_cycle_clamps_delay_to_zero() {
        let counter = Arc::new(InMemoryChangeCounter::new());
        counter.mark_changed();
        let runner = Arc::new(FakeRunner::new(Duration::from_secs(90)));
        let scheduler = PollingScheduler::new(runner, counter, PERIOD);

        let iteration = scheduler.run_iteration().await.unwrap();
        assert_eq!(iteration.next_delay, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mid_cycle_change_is_not_lost() {
        let counter = Arc::new(InMemoryChangeCounter::new());
        counter.mark_changed();
        let runner = Arc::new(ChangingRunner {
            counter: (*counter).clone(),
            changes: 1,
            runs: AtomicUsize::new(0),
        });
        let scheduler = PollingScheduler::new(runner.clone(), counter.clone(), PERIOD);

        let first = scheduler.run_iteration().await.unwrap();
        assert!(matches!(
            first.outcome,
            IterationOutcome::Stale { before: 1, after: 2, .. }
        ));
        assert_eq!(first.next_delay, Duration::ZERO);
        assert_eq!(counter.current(), 2);

        let second = scheduler.run_iteration().await.unwrap();
        assert!(matches!(
            second.outcome,
            IterationOutcome::Converged { consumed: 2, .. }
        ));
        assert_eq!(counter.current(), 0);
        assert_eq!(runner.runs.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.stats().snapshot().stale_cycles, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cycle_keeps_markers() {
        let counter = Arc::new(InMemoryChangeCounter::new());
        counter.mark_changed();
        let runner = Arc::new(FakeRunner::scripted(Duration::ZERO, vec![Step::Fail]));
        let metrics = Arc::new(TestMetrics::default());
        let scheduler = PollingScheduler::new(runner, counter.clone(), PERIOD)
            .with_metrics(metrics.clone());

        let err = scheduler.run_iteration().await.unwrap_err();
        assert!(matches!(err, SchedulerError::Cycle(CycleError::Store(_))));
        assert_eq!(counter.current(), 1);
        assert_eq!(metrics.get_labeled(CYCLES_TOTAL, "result", "failure"), 1);
        assert_eq!(scheduler.stats().snapshot().cycles_failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_counter_failure_is_fatal() {
        let counter = Arc::new(InMemoryChangeCounter::new());
        counter.set_unavailable(true);
        let runner = Arc::new(FakeRunner::new(Duration::ZERO));
        let scheduler = PollingScheduler::new(runner.clone(), counter, PERIOD);

        let err = scheduler.run().await.unwrap_err();
        assert!(matches!(err, SchedulerError::Notifier(_)));
        assert_eq!(runner.started(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_converges_then_stops_on_shutdown() {
        let counter = Arc::new(InMemoryChangeCounter::new());
        counter.mark_changed();
        let runner = Arc::new(ChangingRunner {
            counter: (*counter).clone(),
            changes: 3,
            runs: AtomicUsize::new(0),
        });
        let scheduler = PollingScheduler::new(runner.clone(), counter.clone(), PERIOD);

        // Three stale cycles back to back, then one that converges.
        let shutdown = tokio::time::sleep(Duration::from_secs(1));
        scheduler.run_until(shutdown).await.unwrap();

        assert_eq!(runner.runs.load(Ordering::SeqCst), 4);
        assert_eq!(counter.current(), 0);
    }
}
