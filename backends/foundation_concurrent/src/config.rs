//! Defaults, time units and worker pool sizing for concurrent assertions.

use core::fmt;
use core::time::Duration;
use std::env;
use std::str::FromStr;

use crate::errors::{ConfigError, ConfigResult};

/// Number of times every task is invoked when not configured.
pub const DEFAULT_REPETITIONS: usize = 100;

/// Default bound on how long a run may take, in seconds.
pub const DEFAULT_TIMEOUT_SECS: i64 = 1;

/// How long teardown after a timeout or cancellation waits for in-flight
/// task bodies before detaching their workers.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::ZERO;

/// Environment variable overriding the worker pool size.
pub const THREADS_ENV: &str = "FOUNDATION_CONCURRENT_THREADS";

/// Unit a [`Timeout`] amount is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Lowercase plural name, as used in timeout messages.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Nanoseconds => "nanoseconds",
            Self::Microseconds => "microseconds",
            Self::Milliseconds => "milliseconds",
            Self::Seconds => "seconds",
            Self::Minutes => "minutes",
            Self::Hours => "hours",
            Self::Days => "days",
        }
    }

    /// Converts `amount` of this unit into a [`Duration`], saturating on overflow.
    #[must_use]
    pub const fn to_duration(&self, amount: u64) -> Duration {
        match self {
            Self::Nanoseconds => Duration::from_nanos(amount),
            Self::Microseconds => Duration::from_micros(amount),
            Self::Milliseconds => Duration::from_millis(amount),
            Self::Seconds => Duration::from_secs(amount),
            Self::Minutes => Duration::from_secs(amount.saturating_mul(60)),
            Self::Hours => Duration::from_secs(amount.saturating_mul(60 * 60)),
            Self::Days => Duration::from_secs(amount.saturating_mul(24 * 60 * 60)),
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A strictly positive amount of time in a given unit.
///
/// The amount and unit are kept as given so timeout reports can echo
/// them back exactly ("Timeout after 1 milliseconds").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout {
    amount: i64,
    unit: TimeUnit,
}

impl Timeout {
    /// Creates a timeout, rejecting zero and negative amounts.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NonPositiveTimeout`] when `amount <= 0`.
    pub const fn new(amount: i64, unit: TimeUnit) -> ConfigResult<Self> {
        if amount <= 0 {
            return Err(ConfigError::NonPositiveTimeout);
        }
        Ok(Self { amount, unit })
    }

    #[must_use]
    pub const fn amount(&self) -> i64 {
        self.amount
    }

    #[must_use]
    pub const fn unit(&self) -> TimeUnit {
        self.unit
    }

    #[must_use]
    pub const fn as_duration(&self) -> Duration {
        self.unit.to_duration(self.amount.unsigned_abs())
    }
}

impl Default for Timeout {
    fn default() -> Self {
        Self {
            amount: DEFAULT_TIMEOUT_SECS,
            unit: TimeUnit::Seconds,
        }
    }
}

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.unit)
    }
}

/// [`available_threads`] returns the parallelism reported by the
/// platform, or 1 when it cannot be determined.
#[must_use]
pub fn available_threads() -> usize {
    match std::thread::available_parallelism() {
        Ok(value) => {
            tracing::debug!("thread::available_parallelism() reported: {}", value);
            value.get()
        }
        Err(err) => {
            tracing::debug!("thread::available_parallelism() failed: {}", err);
            1
        }
    }
}

/// [`resolve_pool_size`] picks the worker count for one run.
///
/// An explicit `requested` count wins, then [`THREADS_ENV`] when it holds
/// a positive integer, then [`available_threads`].
#[must_use]
pub fn resolve_pool_size(requested: Option<usize>) -> usize {
    if let Some(count @ 1..) = requested {
        return count;
    }

    match env::var(THREADS_ENV)
        .ok()
        .and_then(|value| usize::from_str(value.trim()).ok())
    {
        Some(count @ 1..) => {
            tracing::debug!("Retrieved worker count {} from {}", count, THREADS_ENV);
            count
        }
        _ => available_threads(),
    }
}
