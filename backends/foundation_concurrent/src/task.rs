//! Tasks: the caller-supplied operations run concurrently by the harness.

use core::fmt;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::errors::BoxedError;
use crate::failures::FailureKind;

pub type TaskResult = Result<(), BoxedError>;

type TaskBody = dyn Fn() -> TaskResult + Send + Sync + 'static;

/// A zero-argument operation that may fail.
///
/// Cloning is cheap: every clone shares the same body, which is what lets
/// one task be invoked by many workers at once.
#[derive(Clone)]
pub struct Task {
    body: Arc<TaskBody>,
}

impl Task {
    /// Wraps a body that only fails by panicking.
    pub fn new<F>(body: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            body: Arc::new(move || -> TaskResult {
                body();
                Ok(())
            }),
        }
    }

    /// Wraps a body that may also fail by returning an error.
    pub fn fallible<F, E>(body: F) -> Self
    where
        F: Fn() -> Result<(), E> + Send + Sync + 'static,
        E: Into<BoxedError>,
    {
        Self {
            body: Arc::new(move || -> TaskResult { body().map_err(Into::into) }),
        }
    }

    /// Runs the body once, catching panics as well as returned errors.
    ///
    /// # Errors
    ///
    /// Returns how the body failed.
    pub fn invoke(&self) -> Result<(), FailureKind> {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.body)())) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(FailureKind::Errored(err)),
            Err(payload) => Err(FailureKind::Panicked(panic_message(payload.as_ref()))),
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").finish_non_exhaustive()
    }
}

/// Renders a panic payload into a message.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
