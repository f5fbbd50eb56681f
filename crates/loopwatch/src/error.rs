//! Error types for the watchdog.
//!
//! Lifecycle errors are synchronous and returned from the call that caused
//! them. Stalls are not errors; they are delivered to the alert sink.

use std::thread::ThreadId;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during watchdog operations.
#[derive(Debug, Error)]
pub enum WatchdogError {
    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A heartbeat was emitted from a thread other than the monitored one.
    #[error("Heartbeat emitted from {actual:?}, but the monitored context is {expected:?}")]
    WrongContext {
        /// Thread the heartbeat source is bound to.
        expected: ThreadId,
        /// Thread that attempted to emit the heartbeat.
        actual: ThreadId,
    },

    /// A heartbeat operation was attempted on a source that is not started.
    #[error("Heartbeat source is not running")]
    NotRunning,

    /// The runtime heartbeat driver was requested outside of a tokio runtime.
    #[error("No tokio runtime available on the monitored context")]
    NoRuntime,

    /// The detector thread could not be created.
    #[error("Failed to spawn detector thread '{name}': {source}")]
    ThreadSpawn {
        /// Requested thread name.
        name: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
}

impl WatchdogError {
    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration(reason.into())
    }

    /// Create a wrong context error.
    #[must_use]
    pub fn wrong_context(expected: ThreadId, actual: ThreadId) -> Self {
        Self::WrongContext { expected, actual }
    }

    /// Create a thread spawn error.
    #[must_use]
    pub fn thread_spawn(name: impl Into<String>, source: std::io::Error) -> Self {
        Self::ThreadSpawn {
            name: name.into(),
            source,
        }
    }

    /// Reject a zero-length interval for the named parameter.
    pub(crate) fn ensure_positive(name: &str, value: Duration) -> WatchdogResult<()> {
        if value.is_zero() {
            return Err(Self::invalid_configuration(format!(
                "{name} must be greater than 0"
            )));
        }
        Ok(())
    }

    /// Whether this error is a precondition violation by the caller.
    #[must_use]
    pub fn is_precondition_violation(&self) -> bool {
        !matches!(self, Self::ThreadSpawn { .. })
    }
}

/// A specialized `Result` type for watchdog operations.
pub type WatchdogResult<T> = std::result::Result<T, WatchdogError>;

/// Failure reported by an alert sink.
#[derive(Debug, Clone, Error)]
#[error("Alert sink '{sink}' failed: {reason}")]
pub struct AlertError {
    /// Name of the failing sink.
    pub sink: String,
    /// Human-readable failure reason.
    pub reason: String,
}

impl AlertError {
    /// Create a new alert error.
    #[must_use]
    pub fn new(sink: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            sink: sink.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WatchdogError::invalid_configuration("poll_interval must be greater than 0");
        assert!(err.to_string().contains("poll_interval"));

        let err = AlertError::new("telemetry", "socket closed");
        assert!(err.to_string().contains("telemetry"));
        assert!(err.to_string().contains("socket closed"));
    }

    #[test]
    fn test_ensure_positive() {
        assert!(WatchdogError::ensure_positive("interval", Duration::ZERO).is_err());
        assert!(WatchdogError::ensure_positive("interval", Duration::from_millis(1)).is_ok());
    }

    #[test]
    fn test_precondition_classification() {
        let err = WatchdogError::invalid_configuration("bad");
        assert!(err.is_precondition_violation());

        let err = WatchdogError::thread_spawn(
            "loopwatch",
            std::io::Error::other("no threads left"),
        );
        assert!(!err.is_precondition_violation());
        assert!(err.to_string().contains("loopwatch"));
    }
}
