// One-shot start gate workers park on until every work item is queued.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};

/// `GateState` is the lifecycle of a [`StartGate`]: it starts `Closed`
/// and moves exactly once to either `Open` or `Abandoned`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateState {
    Closed,
    Open,
    Abandoned,
}

/// What a waiter observed when it left [`StartGate::wait`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateOutcome {
    /// The gate opened; the work item should run.
    Released,
    /// The gate will never open; the work item should stop without
    /// reporting a failure.
    Abandoned,
}

/// `StartGate` blocks any number of threads until a single release.
pub struct StartGate {
    /// Wakes every parked waiter when the state leaves `Closed`.
    event: Condvar,
    lock: Mutex<GateState>,
}

impl Default for StartGate {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for StartGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartGate")
            .field("state", &self.probe())
            .finish()
    }
}

impl StartGate {
    #[must_use]
    pub fn new() -> Self {
        Self {
            event: Condvar::new(),
            lock: Mutex::new(GateState::Closed),
        }
    }

    /// Opens the gate, releasing every current and future waiter.
    ///
    /// Returns false if the gate had already left `Closed`.
    pub fn open(&self) -> bool {
        self.transition(GateState::Open)
    }

    /// Abandons a gate that was never opened.
    ///
    /// Returns false if the gate had already left `Closed`.
    pub fn abandon(&self) -> bool {
        self.transition(GateState::Abandoned)
    }

    #[must_use]
    pub fn probe(&self) -> GateState {
        *self.state()
    }

    /// Blocks until the gate leaves `Closed`.
    pub fn wait(&self) -> GateOutcome {
        let mut state = self.state();
        while *state == GateState::Closed {
            state = match self.event.wait(state) {
                Ok(guard) => guard,
                Err(err) => err.into_inner(),
            };
        }

        match *state {
            GateState::Open => GateOutcome::Released,
            GateState::Closed | GateState::Abandoned => GateOutcome::Abandoned,
        }
    }

    fn transition(&self, next: GateState) -> bool {
        let mut state = self.state();
        if *state != GateState::Closed {
            return false;
        }
        *state = next;
        drop(state);

        self.event.notify_all();
        true
    }

    fn state(&self) -> MutexGuard<'_, GateState> {
        match self.lock.lock() {
            Ok(guard) => guard,
            Err(err) => err.into_inner(),
        }
    }
}

/// Abandons the gate when dropped unless it was opened first, so an
/// early exit from submission never leaves workers parked forever.
#[derive(Debug)]
pub struct AbandonOnDrop(Arc<StartGate>);

impl AbandonOnDrop {
    #[must_use]
    pub fn new(gate: Arc<StartGate>) -> Self {
        Self(gate)
    }
}

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        if self.0.abandon() {
            tracing::debug!("Start gate abandoned before release");
        }
    }
}
