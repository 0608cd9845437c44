//! Concurrent assertions for tests.
//!
//! Runs a set of tasks against shared state from many threads at the same
//! time and fails if any task panics or returns an error, or if the run
//! does not finish within a timeout. No threading code is needed in the
//! test itself.
//!
//! Every (repetition, task) pair is queued on a fixed-size worker pool
//! behind a start gate. The gate opens only after everything is queued,
//! so every worker starts racing at once, which makes thread-safety bugs
//! show up in well under a second.
//!
//! # Examples
//!
//! ```rust
//! use foundation_concurrent::{assert_concurrently, Task, TimeUnit};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let counter = Arc::new(AtomicUsize::new(0));
//! let incrementer = Arc::clone(&counter);
//!
//! assert_concurrently([Task::new(move || {
//!     incrementer.fetch_add(1, Ordering::Relaxed);
//! })])
//! .and_then(|assertions| assertions.repeated_calls(50))
//! .and_then(|assertions| assertions.timeout_after(5, TimeUnit::Seconds))
//! .expect("valid configuration")
//! .should_not_panic();
//!
//! assert_eq!(counter.load(Ordering::Relaxed), 50);
//! ```
//!
//! Tasks built with [`Task::fallible`] return `Result<(), E>`; an `Err`
//! counts as a failure just like a panic:
//!
//! ```rust
//! use foundation_concurrent::{concurrently, AssertionFailure};
//!
//! let failure = concurrently![fallible: || Err("not today")]
//!     .and_then(|assertions| assertions.repeated_calls(2))
//!     .expect("valid configuration")
//!     .run()
//!     .unwrap_err();
//!
//! assert!(matches!(failure, AssertionFailure::Failed(_)));
//! assert_eq!(
//!     failure.to_string(),
//!     "Test failed with the following exception(s): errored: not today, errored: not today"
//! );
//! ```
//!
//! # Configuration
//!
//! - `FOUNDATION_CONCURRENT_THREADS`: overrides the worker count, which
//!   defaults to [`std::thread::available_parallelism`].

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod errors;
pub mod failures;
pub mod gate;
pub mod harness;
pub mod latch;
pub mod pool;
pub mod task;

mod guards;

pub use config::{TimeUnit, Timeout};
pub use errors::{AssertionFailure, AssertionResult, BoxedError, ConfigError, ConfigResult};
pub use failures::{CapturedFailure, ConsolidatedFailure, FailureAggregator, FailureKind};
pub use harness::{assert_concurrently, ConcurrentAssertions};
pub use latch::{CancellationHandle, WaitOutcome};
pub use pool::live_workers;
pub use task::{Task, TaskResult};

/// Builds [`ConcurrentAssertions`] from one or more closures.
///
/// `concurrently![a, b]` is shorthand for
/// `assert_concurrently([Task::new(a), Task::new(b)])`, and
/// `concurrently![fallible: a, b]` for the same with [`Task::fallible`].
#[macro_export]
macro_rules! concurrently {
    (fallible: $($task:expr),+ $(,)?) => {
        $crate::assert_concurrently([$($crate::Task::fallible($task)),+])
    };
    ($($task:expr),+ $(,)?) => {
        $crate::assert_concurrently([$($crate::Task::new($task)),+])
    };
}
