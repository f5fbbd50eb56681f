//! Prelude for loopwatch.
//!
//! This module re-exports the most commonly used types for convenient importing.
//!
//! # Example
//!
//! ```rust
//! use loopwatch::prelude::*;
//!
//! let mut watchdog = UiWatchdog::new(AlertOptions::None);
//! watchdog.start(DEFAULT_HEARTBEAT_INTERVAL)?;
//! watchdog.pump()?;
//! assert_eq!(watchdog.stop(), JoinStatus::Joined);
//! # Ok::<(), WatchdogError>(())
//! ```

pub use crate::alert::{AlertAction, AlertSink, StallAlert};
pub use crate::clock::{Clock, HeartbeatClock, ManualClock};
pub use crate::config::{
    AlertOptions, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_JOIN_TIMEOUT, DEFAULT_POLL_INTERVAL,
    DEFAULT_STALL_THRESHOLD, WatchdogConfig, WatchdogConfigBuilder,
};
pub use crate::detector::{PollOutcome, StallDetector};
pub use crate::error::{AlertError, WatchdogError, WatchdogResult};
pub use crate::heartbeat::HeartbeatSource;
pub use crate::stats::StatsSnapshot;
pub use crate::watchdog::{JoinStatus, UiWatchdog, WatchdogState};
