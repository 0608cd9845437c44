//! Collection of failures raised by task bodies and their consolidation
//! into a single report.

use core::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use concurrent_queue::ConcurrentQueue;

use crate::errors::BoxedError;

/// Prefix of every consolidated failure message.
pub const FAILURE_PREFIX: &str = "Test failed with the following exception(s): ";

/// How a single task invocation failed.
#[derive(Debug)]
pub enum FailureKind {
    /// The task body panicked; holds the rendered panic payload.
    Panicked(String),
    /// The task body returned an error.
    Errored(BoxedError),
}

/// A failure caught from exactly one work item.
#[derive(Debug)]
pub struct CapturedFailure {
    task: usize,
    repetition: usize,
    kind: FailureKind,
}

impl CapturedFailure {
    #[must_use]
    pub fn new(task: usize, repetition: usize, kind: FailureKind) -> Self {
        Self {
            task,
            repetition,
            kind,
        }
    }

    /// Position of the failing task in the configured task list.
    #[must_use]
    pub fn task(&self) -> usize {
        self.task
    }

    /// Repetition (starting at 1) the failure happened in.
    #[must_use]
    pub fn repetition(&self) -> usize {
        self.repetition
    }

    #[must_use]
    pub fn kind(&self) -> &FailureKind {
        &self.kind
    }

    #[must_use]
    pub fn is_panic(&self) -> bool {
        matches!(self.kind, FailureKind::Panicked(_))
    }
}

impl fmt::Display for CapturedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FailureKind::Panicked(message) => write!(f, "panicked: {message}"),
            FailureKind::Errored(err) => write!(f, "errored: {err}"),
        }
    }
}

impl std::error::Error for CapturedFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            FailureKind::Errored(err) => Some(err.as_ref()),
            FailureKind::Panicked(_) => None,
        }
    }
}

/// One failure summarising every failure captured during a run.
///
/// Never empty. The cause is the first failure in aggregator order,
/// which under concurrency is not necessarily the first in wall-clock time.
#[derive(Debug, Clone)]
pub struct ConsolidatedFailure {
    failures: Vec<Arc<CapturedFailure>>,
}

impl ConsolidatedFailure {
    #[must_use]
    pub fn cause(&self) -> &CapturedFailure {
        &self.failures[0]
    }

    #[must_use]
    pub fn failures(&self) -> &[Arc<CapturedFailure>] {
        &self.failures
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for ConsolidatedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(FAILURE_PREFIX)?;
        for (index, failure) in self.failures.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ConsolidatedFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.cause())
    }
}

/// `FailureAggregator` collects failures from any number of worker
/// threads.
///
/// Workers push into a lock-free queue; inspection moves whatever is
/// queued into a settled list so repeated inspection reports the same
/// failures in the same order.
pub struct FailureAggregator {
    pending: ConcurrentQueue<CapturedFailure>,
    settled: Mutex<Vec<Arc<CapturedFailure>>>,
}

impl fmt::Debug for FailureAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureAggregator")
            .field("captured", &self.len())
            .finish()
    }
}

impl Default for FailureAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl FailureAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: ConcurrentQueue::unbounded(),
            settled: Mutex::new(Vec::new()),
        }
    }

    /// Records a failure. Safe to call from any thread.
    pub fn add(&self, failure: CapturedFailure) {
        if let Err(err) = self.pending.push(failure) {
            // the queue is unbounded and never closed, keep the failure anyway
            self.settle().push(Arc::new(err.into_inner()));
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.settle().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Passes when nothing was captured, otherwise returns one
    /// [`ConsolidatedFailure`] over every captured failure.
    ///
    /// # Errors
    ///
    /// Returns the consolidated failure when at least one failure was added.
    pub fn assert_not_thrown(&self) -> Result<(), ConsolidatedFailure> {
        let settled = self.settle();
        if settled.is_empty() {
            return Ok(());
        }

        Err(ConsolidatedFailure {
            failures: settled.clone(),
        })
    }

    fn settle(&self) -> MutexGuard<'_, Vec<Arc<CapturedFailure>>> {
        let mut settled = match self.settled.lock() {
            Ok(guard) => guard,
            Err(err) => err.into_inner(),
        };

        while let Ok(failure) = self.pending.pop() {
            settled.push(Arc::new(failure));
        }
        settled
    }
}
