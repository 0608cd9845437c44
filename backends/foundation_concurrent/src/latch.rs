// Count-down latch signalling that every work item has finished.

use core::time::Duration;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};

/// Result of a bounded wait on a [`CompletionLatch`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The count reached zero.
    Completed,
    /// The bound elapsed first.
    TimedOut,
    /// The latch was cancelled while work was still outstanding.
    Cancelled,
}

#[derive(Debug)]
struct LatchState {
    remaining: usize,
    cancelled: bool,
}

/// `CompletionLatch` counts down from the number of work items to zero.
///
/// Every work item counts down exactly once, whether it succeeded, failed
/// or was discarded.
pub struct CompletionLatch {
    event: Condvar,
    lock: Mutex<LatchState>,
}

impl core::fmt::Debug for CompletionLatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("CompletionLatch")
            .field("remaining", &state.remaining)
            .field("cancelled", &state.cancelled)
            .finish()
    }
}

impl CompletionLatch {
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self {
            event: Condvar::new(),
            lock: Mutex::new(LatchState {
                remaining: count,
                cancelled: false,
            }),
        }
    }

    /// Decrements the count, waking waiters when it reaches zero.
    /// Extra calls past zero are ignored.
    pub fn count_down(&self) {
        let mut state = self.state();
        if state.remaining == 0 {
            return;
        }
        state.remaining -= 1;
        let done = state.remaining == 0;
        drop(state);

        if done {
            self.event.notify_all();
        }
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.state().remaining
    }

    /// Cancels the latch, waking every waiter.
    pub fn cancel(&self) {
        let mut state = self.state();
        state.cancelled = true;
        drop(state);
        self.event.notify_all();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state().cancelled
    }

    /// Waits for the count to reach zero, at most `timeout`.
    ///
    /// Completion wins over cancellation when both are observed.
    pub fn wait_timeout(&self, timeout: Duration) -> WaitOutcome {
        let state = self.state();
        let (state, _) = self
            .event
            .wait_timeout_while(state, timeout, |state| {
                state.remaining > 0 && !state.cancelled
            })
            .unwrap_or_else(PoisonError::into_inner);

        if state.remaining == 0 {
            WaitOutcome::Completed
        } else if state.cancelled {
            WaitOutcome::Cancelled
        } else {
            WaitOutcome::TimedOut
        }
    }

    fn state(&self) -> MutexGuard<'_, LatchState> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Default)]
struct CancelSlot {
    cancelled: bool,
    latch: Option<Weak<CompletionLatch>>,
}

/// `CancellationHandle` lets another thread stop a run that is waiting
/// for its work items.
///
/// A handle cancelled before the run starts cancels the run's wait as
/// soon as it begins. Clones share the same cancellation.
#[derive(Clone, Debug, Default)]
pub struct CancellationHandle {
    slot: Arc<Mutex<CancelSlot>>,
}

impl CancellationHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let mut slot = self.slot();
        slot.cancelled = true;
        let latch = slot.latch.as_ref().and_then(Weak::upgrade);
        drop(slot);

        if let Some(latch) = latch {
            tracing::debug!("Cancelling in-progress concurrent run");
            latch.cancel();
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.slot().cancelled
    }

    pub(crate) fn attach(&self, latch: &Arc<CompletionLatch>) {
        let mut slot = self.slot();
        slot.latch = Some(Arc::downgrade(latch));
        if slot.cancelled {
            latch.cancel();
        }
    }

    fn slot(&self) -> MutexGuard<'_, CancelSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
