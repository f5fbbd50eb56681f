//! Alert delivery.
//!
//! The detector depends only on [`AlertAction`]; what happens on a stall
//! (logging, breaking into a debugger, forwarding to telemetry) is decided by
//! the caller at construction time.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AlertOptions;
use crate::error::AlertError;

/// Tracing target for stall records.
pub const STALL_LOG_TARGET: &str = "loopwatch::stall";

/// A single stall observation delivered to the alert sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StallAlert {
    /// Time since the last heartbeat at the moment of detection.
    pub elapsed: Duration,
    /// Threshold that was exceeded.
    pub threshold: Duration,
    /// 1-based count of alerts raised by this detector run.
    pub sequence: u64,
}

impl StallAlert {
    /// Elapsed time in whole milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX)
    }

    /// How far past the threshold the monitored context is.
    #[must_use]
    pub fn overrun(&self) -> Duration {
        self.elapsed.saturating_sub(self.threshold)
    }
}

/// Receiver of stall alerts.
///
/// Called on the detector thread, once per poll while a stall persists.
/// Implementations must not block for long: a slow sink delays the next poll
/// and the detector's shutdown.
pub trait AlertSink: Send + Sync {
    /// Name used in failure reports.
    fn name(&self) -> &str {
        "custom"
    }

    /// Handle a stall.
    ///
    /// # Errors
    ///
    /// Returned errors are logged and counted by the detector; they do not
    /// stop polling.
    fn on_stall(&self, alert: &StallAlert) -> Result<(), AlertError>;
}

/// Adapter turning a closure into an [`AlertSink`].
pub struct FnSink<F> {
    name: String,
    f: F,
}

impl<F> FnSink<F>
where
    F: Fn(&StallAlert) -> Result<(), AlertError> + Send + Sync,
{
    /// Wrap `f` under the given sink name.
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> AlertSink for FnSink<F>
where
    F: Fn(&StallAlert) -> Result<(), AlertError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn on_stall(&self, alert: &StallAlert) -> Result<(), AlertError> {
        (self.f)(alert)
    }
}

impl<F> fmt::Debug for FnSink<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSink").field("name", &self.name).finish()
    }
}

/// What the detector does when a stall is observed.
///
/// Every variant emits a `warn` record on [`STALL_LOG_TARGET`].
#[derive(Clone, Default)]
pub enum AlertAction {
    /// Log the stall.
    #[default]
    LogOnly,
    /// Log the stall and break into an attached debugger.
    LogAndBreak,
    /// Log the stall and forward it to a caller-supplied sink.
    Custom(Arc<dyn AlertSink>),
}

impl AlertAction {
    /// The built-in action matching the given options.
    #[must_use]
    pub fn from_options(options: AlertOptions) -> Self {
        match options {
            AlertOptions::None => Self::LogOnly,
            AlertOptions::DebugBreak => Self::LogAndBreak,
        }
    }

    /// Forward alerts to `sink`.
    pub fn custom(sink: impl AlertSink + 'static) -> Self {
        Self::Custom(Arc::new(sink))
    }

    /// Forward alerts to a closure.
    pub fn from_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&StallAlert) -> Result<(), AlertError> + Send + Sync + 'static,
    {
        Self::custom(FnSink::new(name, f))
    }

    /// Deliver one alert.
    ///
    /// # Errors
    ///
    /// Propagates the custom sink's error.
    pub fn fire(&self, alert: &StallAlert) -> Result<(), AlertError> {
        tracing::warn!(
            target: STALL_LOG_TARGET,
            elapsed_ms = alert.elapsed_ms(),
            threshold_ms = u64::try_from(alert.threshold.as_millis()).unwrap_or(u64::MAX),
            sequence = alert.sequence,
            "Monitored loop is blocked"
        );

        match self {
            Self::LogOnly => Ok(()),
            Self::LogAndBreak => {
                let outcome = debug_break::trigger();
                tracing::debug!(target: STALL_LOG_TARGET, outcome = ?outcome, "Debug break requested");
                Ok(())
            }
            Self::Custom(sink) => sink.on_stall(alert),
        }
    }

    /// Name of the sink receiving alerts.
    #[must_use]
    pub fn sink_name(&self) -> &str {
        match self {
            Self::LogOnly => "log",
            Self::LogAndBreak => "log+break",
            Self::Custom(sink) => sink.name(),
        }
    }
}

impl From<AlertOptions> for AlertAction {
    fn from(options: AlertOptions) -> Self {
        Self::from_options(options)
    }
}

impl fmt::Debug for AlertAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LogOnly => write!(f, "LogOnly"),
            Self::LogAndBreak => write!(f, "LogAndBreak"),
            Self::Custom(sink) => f.debug_tuple("Custom").field(&sink.name()).finish(),
        }
    }
}

/// Debugger break support.
pub mod debug_break {
    /// Result of a debugger break request.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum BreakOutcome {
        /// `SIGTRAP` was raised for the attached debugger.
        Raised,
        /// No debugger is attached; breaking would terminate the process.
        NoDebugger,
        /// This platform has no safe break primitive.
        Unsupported,
        /// Raising the trap failed.
        Failed,
    }

    /// Break into the attached debugger, if any.
    #[must_use]
    pub fn trigger() -> BreakOutcome {
        #[cfg(unix)]
        {
            if !debugger_attached() {
                return BreakOutcome::NoDebugger;
            }
            match nix::sys::signal::raise(nix::sys::signal::Signal::SIGTRAP) {
                Ok(()) => BreakOutcome::Raised,
                Err(errno) => {
                    tracing::warn!(error = %errno, "Failed to raise SIGTRAP");
                    BreakOutcome::Failed
                }
            }
        }
        #[cfg(not(unix))]
        {
            BreakOutcome::Unsupported
        }
    }

    /// Whether a tracer is attached to this process.
    #[must_use]
    pub fn debugger_attached() -> bool {
        #[cfg(target_os = "linux")]
        {
            std::fs::read_to_string("/proc/self/status")
                .ok()
                .and_then(|status| parse_tracer_pid(&status))
                .is_some_and(|pid| pid != 0)
        }
        #[cfg(not(target_os = "linux"))]
        {
            false
        }
    }

    /// Extract `TracerPid` from a `/proc/<pid>/status` document.
    #[must_use]
    pub fn parse_tracer_pid(status: &str) -> Option<u32> {
        status
            .lines()
            .find_map(|line| line.strip_prefix("TracerPid:"))
            .and_then(|value| value.trim().parse().ok())
    }
}
