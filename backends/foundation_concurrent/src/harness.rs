//! Concurrent assertions: configure a set of tasks, run every
//! (repetition, task) pair on a worker pool behind a shared start gate,
//! and turn panics, errors and timeouts into one reported failure.

use core::time::Duration;
use std::sync::Arc;

use crate::config::{self, TimeUnit, Timeout, DEFAULT_REPETITIONS, DEFAULT_SHUTDOWN_GRACE};
use crate::errors::{AssertionFailure, AssertionResult, ConfigError, ConfigResult};
use crate::failures::{CapturedFailure, FailureAggregator};
use crate::gate::{AbandonOnDrop, GateOutcome, StartGate};
use crate::guards::RunOnDrop;
use crate::latch::{CancellationHandle, CompletionLatch, WaitOutcome};
use crate::pool::WorkerPool;
use crate::task::Task;

/// Starts configuring a concurrent assertion over `tasks`.
///
/// Defaults to 100 repetitions, a 1 second timeout and one worker per
/// available processing unit.
///
/// # Errors
///
/// Returns [`ConfigError::NoTasks`] when `tasks` is empty.
pub fn assert_concurrently<I>(tasks: I) -> ConfigResult<ConcurrentAssertions>
where
    I: IntoIterator<Item = Task>,
{
    let tasks: Vec<Task> = tasks.into_iter().collect();
    if tasks.is_empty() {
        return Err(ConfigError::NoTasks);
    }

    Ok(ConcurrentAssertions {
        tasks,
        repetitions: DEFAULT_REPETITIONS,
        timeout: Timeout::default(),
        threads: None,
        shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        cancellation: CancellationHandle::new(),
    })
}

/// Configuration of one concurrent run.
///
/// Built fresh for each test and consumed by [`ConcurrentAssertions::run`];
/// every run creates its own pool, gate, latch and failure collection.
#[derive(Debug)]
pub struct ConcurrentAssertions {
    tasks: Vec<Task>,
    repetitions: usize,
    timeout: Timeout,
    threads: Option<usize>,
    shutdown_grace: Duration,
    cancellation: CancellationHandle,
}

impl ConcurrentAssertions {
    /// Sets how many times each task is invoked.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NonPositiveRepetitions`] for zero.
    pub fn repeated_calls(mut self, repetitions: usize) -> ConfigResult<Self> {
        if repetitions == 0 {
            return Err(ConfigError::NonPositiveRepetitions);
        }
        self.repetitions = repetitions;
        Ok(self)
    }

    /// Bounds how long the run may take.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NonPositiveTimeout`] when `amount <= 0`.
    pub fn timeout_after(mut self, amount: i64, unit: TimeUnit) -> ConfigResult<Self> {
        self.timeout = Timeout::new(amount, unit)?;
        Ok(self)
    }

    /// Overrides the worker count, which otherwise comes from
    /// `FOUNDATION_CONCURRENT_THREADS` or the available parallelism.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NonPositiveThreads`] for zero.
    pub fn threads(mut self, count: usize) -> ConfigResult<Self> {
        if count == 0 {
            return Err(ConfigError::NonPositiveThreads);
        }
        self.threads = Some(count);
        Ok(self)
    }

    /// Sets how long teardown after a timeout or cancellation waits for
    /// task bodies still running. Defaults to zero, so the failure is
    /// reported at once and busy workers finish on their own.
    #[must_use]
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Returns a handle that cancels this run's wait from another thread.
    #[must_use]
    pub fn cancellation(&self) -> CancellationHandle {
        self.cancellation.clone()
    }

    #[must_use]
    pub fn repetitions(&self) -> usize {
        self.repetitions
    }

    #[must_use]
    pub fn timeout(&self) -> Timeout {
        self.timeout
    }

    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Number of scheduled units: repetitions times tasks.
    #[must_use]
    pub fn work_items(&self) -> usize {
        self.repetitions.saturating_mul(self.tasks.len())
    }

    /// Runs every work item concurrently and reports the outcome.
    ///
    /// A timeout or cancellation is reported on its own, even when task
    /// failures were also captured.
    ///
    /// # Errors
    ///
    /// Returns [`AssertionFailure::Timeout`], [`AssertionFailure::Cancelled`],
    /// [`AssertionFailure::Pool`], or [`AssertionFailure::Failed`] with
    /// every captured failure.
    pub fn run(self) -> AssertionResult<()> {
        let span = tracing::trace_span!(
            "ConcurrentAssertions::run",
            tasks = self.tasks.len(),
            repetitions = self.repetitions
        );
        let _enter = span.enter();

        let failures = Arc::new(FailureAggregator::new());
        self.execute(&failures)?;

        failures.assert_not_thrown().map_err(|report| {
            tracing::debug!("{} work item(s) failed", report.len());
            AssertionFailure::from(report)
        })
    }

    /// Like [`ConcurrentAssertions::run`], but panics with the failure
    /// message, for use directly in tests.
    ///
    /// # Panics
    ///
    /// Panics when the run does not pass.
    #[track_caller]
    pub fn should_not_panic(self) {
        if let Err(failure) = self.run() {
            panic!("{failure}");
        }
    }

    fn execute(&self, failures: &Arc<FailureAggregator>) -> AssertionResult<()> {
        let pool_size = config::resolve_pool_size(self.threads);
        let mut pool = WorkerPool::new(pool_size)?;

        // a completed latch means every task body has returned
        let outcome = self.schedule(&pool, failures);
        let discarded = match outcome {
            Ok(()) => pool.shutdown(),
            Err(_) => pool.shutdown_now(self.shutdown_grace),
        };
        if discarded > 0 {
            tracing::debug!("{} work item(s) never started", discarded);
        }
        outcome
    }

    fn schedule(
        &self,
        pool: &WorkerPool,
        failures: &Arc<FailureAggregator>,
    ) -> AssertionResult<()> {
        let gate = Arc::new(StartGate::new());
        let abandon = AbandonOnDrop::new(Arc::clone(&gate));
        let latch = Arc::new(CompletionLatch::new(self.work_items()));
        self.cancellation.attach(&latch);

        for repetition in 1..=self.repetitions {
            for (index, task) in self.tasks.iter().enumerate() {
                let task = task.clone();
                let gate = Arc::clone(&gate);
                let failures = Arc::clone(failures);
                let finished = {
                    let latch = Arc::clone(&latch);
                    RunOnDrop::new(move || latch.count_down())
                };

                pool.execute(move || {
                    let _finished = finished;
                    if gate.wait() == GateOutcome::Abandoned {
                        tracing::trace!("Work item skipped, start gate abandoned");
                        return;
                    }

                    if let Err(kind) = task.invoke() {
                        failures.add(CapturedFailure::new(index, repetition, kind));
                    }
                });
            }
        }

        if self.cancellation.is_cancelled() {
            tracing::debug!("Run cancelled before release, abandoning start gate");
            drop(abandon);
            return Err(AssertionFailure::Cancelled);
        }

        tracing::debug!(
            "Submitted {} work item(s) to {} worker(s), releasing start gate",
            self.work_items(),
            pool.size()
        );
        gate.open();

        match latch.wait_timeout(self.timeout.as_duration()) {
            WaitOutcome::Completed => Ok(()),
            WaitOutcome::TimedOut => {
                tracing::warn!(
                    "Timed out after {} with {} work item(s) outstanding",
                    self.timeout,
                    latch.count()
                );
                Err(AssertionFailure::Timeout {
                    amount: self.timeout.amount(),
                    unit: self.timeout.unit(),
                })
            }
            WaitOutcome::Cancelled => {
                tracing::debug!("Run cancelled with {} work item(s) outstanding", latch.count());
                Err(AssertionFailure::Cancelled)
            }
        }
    }
}
