//! Watchdog configuration.
//!
//! Durations are (de)serialized as integer milliseconds so configuration
//! files read naturally:
//!
//! ```json
//! { "heartbeat_interval_ms": 100, "poll_interval_ms": 200,
//!   "stall_threshold_ms": 300, "join_timeout_ms": 2000,
//!   "options": "debug_break" }
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{WatchdogError, WatchdogResult};

/// Default cadence at which the monitored context emits heartbeats.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(100);

/// Default cadence at which the detector polls the heartbeat clock.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Default maximum tolerated time since the last heartbeat.
pub const DEFAULT_STALL_THRESHOLD: Duration = Duration::from_millis(300);

/// Default upper bound on waiting for the detector thread to exit.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_millis(2000);

/// Default name given to the detector thread.
pub const DEFAULT_THREAD_NAME: &str = "loopwatch-detector";

/// Extra behavior on alert, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertOptions {
    /// Log the stall only.
    #[default]
    None,
    /// Log the stall and break into an attached debugger.
    ///
    /// Only Unix raises a trap, and only Linux can detect an attached
    /// debugger (via `/proc/self/status`). Elsewhere this behaves like
    /// [`AlertOptions::None`] plus a debug record saying the break was
    /// skipped.
    DebugBreak,
}

impl AlertOptions {
    /// Whether a debugger break is requested.
    #[must_use]
    pub fn debug_break(self) -> bool {
        matches!(self, Self::DebugBreak)
    }
}

impl std::fmt::Display for AlertOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertOptions::None => write!(f, "none"),
            AlertOptions::DebugBreak => write!(f, "debug-break"),
        }
    }
}

/// Watchdog configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Interval between heartbeats emitted by the monitored context.
    #[serde(rename = "heartbeat_interval_ms", with = "millis")]
    pub heartbeat_interval: Duration,
    /// Interval between detector polls.
    #[serde(rename = "poll_interval_ms", with = "millis")]
    pub poll_interval: Duration,
    /// Elapsed time since the last heartbeat above which an alert fires.
    #[serde(rename = "stall_threshold_ms", with = "millis")]
    pub stall_threshold: Duration,
    /// Upper bound on `stop()` waiting for the detector thread.
    #[serde(rename = "join_timeout_ms", with = "millis")]
    pub join_timeout: Duration,
    /// Extra alert behavior.
    pub options: AlertOptions,
    /// Name of the detector thread.
    pub thread_name: String,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stall_threshold: DEFAULT_STALL_THRESHOLD,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            options: AlertOptions::None,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

impl WatchdogConfig {
    /// Validate the configuration.
    ///
    /// A threshold at or below the heartbeat interval is accepted but logged:
    /// ordinary scheduling jitter will then raise false alarms.
    ///
    /// # Errors
    ///
    /// Returns an error if any interval is zero or the thread name is empty.
    pub fn validate(&self) -> WatchdogResult<()> {
        WatchdogError::ensure_positive("heartbeat_interval", self.heartbeat_interval)?;
        WatchdogError::ensure_positive("poll_interval", self.poll_interval)?;
        WatchdogError::ensure_positive("stall_threshold", self.stall_threshold)?;
        WatchdogError::ensure_positive("join_timeout", self.join_timeout)?;
        if self.thread_name.trim().is_empty() {
            return Err(WatchdogError::invalid_configuration(
                "thread_name must not be empty",
            ));
        }
        if self.stall_threshold <= self.heartbeat_interval {
            tracing::warn!(
                stall_threshold_ms = self.stall_threshold.as_millis(),
                heartbeat_interval_ms = self.heartbeat_interval.as_millis(),
                "Stall threshold does not exceed the heartbeat interval; expect false alarms"
            );
        }
        Ok(())
    }

    /// Worst-case delay between the last heartbeat and the first alert.
    #[must_use]
    pub fn detection_latency(&self) -> Duration {
        self.stall_threshold.saturating_add(self.poll_interval)
    }

    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> WatchdogConfigBuilder {
        WatchdogConfigBuilder::default()
    }
}

/// Builder for `WatchdogConfig`.
#[derive(Debug, Default)]
pub struct WatchdogConfigBuilder {
    config: WatchdogConfig,
}

impl WatchdogConfigBuilder {
    /// Set the heartbeat interval.
    #[must_use]
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    /// Set the detector poll interval.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set the stall threshold.
    #[must_use]
    pub fn stall_threshold(mut self, threshold: Duration) -> Self {
        self.config.stall_threshold = threshold;
        self
    }

    /// Set the shutdown join bound.
    #[must_use]
    pub fn join_timeout(mut self, timeout: Duration) -> Self {
        self.config.join_timeout = timeout;
        self
    }

    /// Set the alert options.
    #[must_use]
    pub fn options(mut self, options: AlertOptions) -> Self {
        self.config.options = options;
        self
    }

    /// Set the detector thread name.
    #[must_use]
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.thread_name = name.into();
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> WatchdogResult<WatchdogConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
