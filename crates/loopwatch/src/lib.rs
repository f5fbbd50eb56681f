//! # loopwatch
//!
//! Liveness watchdog for a monitored event loop (typically a UI or main
//! thread).
//!
//! The monitored loop emits heartbeats into a shared [`HeartbeatClock`]; a
//! dedicated background thread polls the clock and raises an alert whenever
//! the time since the last heartbeat exceeds a threshold. The watchdog only
//! observes: it never tries to unblock the monitored loop.
//!
//! ## Architecture
//!
//! - [`heartbeat`] - Heartbeat emission on the monitored context
//! - [`detector`] - Polling and threshold logic on the background thread
//! - [`watchdog`] - The [`UiWatchdog`] controller and its lifecycle
//! - [`clock`] - Time sources and the shared heartbeat stopwatch
//! - [`alert`] - Alert records, sinks and debugger breaks
//! - [`config`] - Configuration and defaults
//! - [`stats`] - Lock-free detector counters
//! - [`spawner`] - Detector thread creation
//! - [`error`] - Watchdog-specific error types
//!
//! ## Threading
//!
//! Exactly two threads are involved: the monitored context, which emits
//! heartbeats, and the detector thread, which polls. The heartbeat clock is
//! the only state they share; its guard is held for a single read or write
//! and never across an alert.
//!
//! ## Example
//!
//! ```rust
//! use loopwatch::prelude::*;
//! use std::time::Duration;
//!
//! let config = WatchdogConfig::builder()
//!     .poll_interval(Duration::from_millis(50))
//!     .stall_threshold(Duration::from_millis(150))
//!     .build()?;
//!
//! let mut watchdog = UiWatchdog::with_config(config)?
//!     .with_alert_action(AlertAction::from_fn("stderr", |alert| {
//!         eprintln!("main loop blocked for {} ms", alert.elapsed_ms());
//!         Ok(())
//!     }));
//!
//! watchdog.start(Duration::from_millis(20))?;
//! for _ in 0..5 {
//!     watchdog.pump()?;
//!     std::thread::sleep(Duration::from_millis(10));
//! }
//! assert!(watchdog.stop().is_clean());
//! # Ok::<(), WatchdogError>(())
//! ```

#![deny(
    unsafe_op_in_unsafe_fn,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::panic,
    missing_docs,
    missing_debug_implementations
)]
#![warn(clippy::pedantic)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod alert;
pub mod clock;
pub mod config;
pub mod detector;
pub mod error;
pub mod heartbeat;
pub mod spawner;
pub mod stats;
pub mod watchdog;

pub mod prelude;

pub use alert::{AlertAction, AlertSink, FnSink, STALL_LOG_TARGET, StallAlert};
pub use clock::{Clock, HeartbeatClock, ManualClock, MonotonicClock};
pub use config::{
    AlertOptions, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_JOIN_TIMEOUT, DEFAULT_POLL_INTERVAL,
    DEFAULT_STALL_THRESHOLD, WatchdogConfig, WatchdogConfigBuilder,
};
pub use detector::{PollOutcome, StallDetector, StopHandle, StopToken, stop_channel};
pub use error::{AlertError, WatchdogError, WatchdogResult};
pub use heartbeat::{HeartbeatDriver, HeartbeatSource};
pub use spawner::{StdThreadSpawner, ThreadSpawner, WorkerFn};
pub use stats::{DetectorStats, StatsSnapshot};
pub use watchdog::{JoinStatus, UiWatchdog, WatchdogState};
