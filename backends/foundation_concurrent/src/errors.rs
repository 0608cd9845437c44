use derive_more::From;

use std::io;

use crate::config::TimeUnit;
use crate::failures::{CapturedFailure, ConsolidatedFailure};

pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Rejected configuration, raised synchronously by the builder before
/// anything is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    NonPositiveTimeout,
    NonPositiveRepetitions,
    NonPositiveThreads,
    NoTasks,
}

impl std::error::Error for ConfigError {}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonPositiveTimeout => write!(f, "Timeout must have positive value"),
            Self::NonPositiveRepetitions => write!(f, "Repetitions must have positive value"),
            Self::NonPositiveThreads => write!(f, "Thread count must have positive value"),
            Self::NoTasks => write!(f, "At least one task is required"),
        }
    }
}

pub type AssertionResult<T> = std::result::Result<T, AssertionFailure>;

/// Why a concurrent run did not pass.
#[derive(From, Debug)]
pub enum AssertionFailure {
    /// The completion wait gave up before every work item finished.
    #[from(ignore)]
    Timeout { amount: i64, unit: TimeUnit },

    /// One or more task bodies panicked or returned an error.
    Failed(ConsolidatedFailure),

    /// The wait was cancelled through a [`crate::CancellationHandle`].
    #[from(ignore)]
    Cancelled,

    /// The worker pool could not be started.
    Pool(io::Error),
}

impl AssertionFailure {
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns the consolidated report when task bodies failed.
    #[must_use]
    pub fn consolidated(&self) -> Option<&ConsolidatedFailure> {
        match self {
            Self::Failed(report) => Some(report),
            _ => None,
        }
    }

    /// Returns the failure reported as the underlying cause, if any.
    #[must_use]
    pub fn cause(&self) -> Option<&CapturedFailure> {
        self.consolidated().map(ConsolidatedFailure::cause)
    }
}

impl std::error::Error for AssertionFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Failed(report) => std::error::Error::source(report),
            Self::Pool(err) => Some(err),
            Self::Timeout { .. } | Self::Cancelled => None,
        }
    }
}

impl core::fmt::Display for AssertionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout { amount, unit } => write!(f, "Timeout after {amount} {unit}"),
            Self::Failed(report) => write!(f, "{report}"),
            Self::Cancelled => write!(f, "Concurrent run was cancelled before completion"),
            Self::Pool(err) => write!(f, "Unable to start worker pool: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn config_errors_render_their_messages() {
        assert_eq!(
            ConfigError::NonPositiveTimeout.to_string(),
            "Timeout must have positive value"
        );
        assert_eq!(
            ConfigError::NonPositiveRepetitions.to_string(),
            "Repetitions must have positive value"
        );
        assert_eq!(ConfigError::NoTasks.to_string(), "At least one task is required");
    }

    #[test]
    fn timeout_message_names_amount_and_lowercased_unit() {
        let failure = AssertionFailure::Timeout {
            amount: 1,
            unit: TimeUnit::Milliseconds,
        };
        assert!(failure.is_timeout());
        assert!(failure.source().is_none());
        assert_eq!(failure.to_string(), "Timeout after 1 milliseconds");
    }

    #[test]
    fn pool_errors_keep_their_source() {
        let failure = AssertionFailure::from(io::Error::other("no threads left"));
        assert!(failure.source().is_some());
        assert_eq!(
            failure.to_string(),
            "Unable to start worker pool: no threads left"
        );
    }
}
