//! Watchdog controller.
//!
//! [`UiWatchdog`] owns the heartbeat source, the shared clock and the
//! detector thread, and drives the `Stopped -> Running -> Stopped` lifecycle.
//!
//! # Lifecycle
//!
//! ```text
//! ┌─────────┐   start()   ┌─────────┐
//! │ Stopped │────────────►│ Running │
//! └─────────┘             └─────────┘
//!      ▲                       │
//!      └──────── stop() ───────┘
//! ```
//!
//! Both transitions are idempotent. `stop()` waits at most
//! [`WatchdogConfig::join_timeout`] for the detector thread; if the thread
//! does not exit in time it is detached and the anomaly is reported.

use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::alert::AlertAction;
use crate::clock::{Clock, HeartbeatClock};
use crate::config::{AlertOptions, WatchdogConfig};
use crate::detector::{self, StallDetector, StopHandle, panic_message};
use crate::error::{WatchdogError, WatchdogResult};
use crate::heartbeat::{HeartbeatDriver, HeartbeatSource};
use crate::spawner::{StdThreadSpawner, ThreadSpawner};
use crate::stats::{DetectorStats, StatsSnapshot};

/// Lifecycle state of a [`UiWatchdog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WatchdogState {
    /// No detector thread exists.
    #[default]
    Stopped,
    /// Heartbeats are scheduled and the detector thread is polling.
    Running,
}

impl std::fmt::Display for WatchdogState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchdogState::Stopped => write!(f, "Stopped"),
            WatchdogState::Running => write!(f, "Running"),
        }
    }
}

/// How the detector thread ended when the watchdog was stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[must_use]
pub enum JoinStatus {
    /// The watchdog was not running.
    NotRunning,
    /// The thread exited within the join bound.
    Joined,
    /// The thread did not exit within the join bound and was detached.
    TimedOut,
    /// The thread exited by panicking.
    Panicked,
}

impl JoinStatus {
    /// Whether no anomaly occurred.
    #[must_use]
    pub fn is_clean(self) -> bool {
        matches!(self, Self::NotRunning | Self::Joined)
    }
}

struct Worker {
    stop: StopHandle,
    exited: Receiver<()>,
    handle: JoinHandle<()>,
}

/// Liveness watchdog for one monitored loop.
///
/// The thread that calls [`start`](Self::start) becomes the monitored
/// context. With the pumped driver, the monitored loop must call
/// [`pump`](Self::pump) on every iteration.
///
/// # Example
///
/// ```rust
/// use loopwatch::prelude::*;
/// use std::time::Duration;
///
/// let mut watchdog = UiWatchdog::new(AlertOptions::None);
/// watchdog.start(DEFAULT_HEARTBEAT_INTERVAL)?;
///
/// for _ in 0..10 {
///     // ... process one batch of events ...
///     watchdog.pump()?;
///     std::thread::sleep(Duration::from_millis(5));
/// }
///
/// assert!(watchdog.stop().is_clean());
/// # Ok::<(), WatchdogError>(())
/// ```
pub struct UiWatchdog {
    config: WatchdogConfig,
    action: AlertAction,
    spawner: Arc<dyn ThreadSpawner>,
    clock: Arc<HeartbeatClock>,
    heartbeat: HeartbeatSource,
    stats: Arc<DetectorStats>,
    worker: Option<Worker>,
}

impl UiWatchdog {
    /// Create a stopped watchdog with default timing and the given options.
    #[must_use]
    pub fn new(options: AlertOptions) -> Self {
        let config = WatchdogConfig {
            options,
            ..WatchdogConfig::default()
        };
        Self::build(config)
    }

    /// Create a stopped watchdog from a configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_config(config: WatchdogConfig) -> WatchdogResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: WatchdogConfig) -> Self {
        let clock = Arc::new(HeartbeatClock::monotonic());
        tracing::debug!(options = %config.options, "UiWatchdog created");
        Self {
            action: AlertAction::from_options(config.options),
            spawner: Arc::new(StdThreadSpawner),
            heartbeat: HeartbeatSource::new(Arc::clone(&clock)),
            stats: Arc::new(DetectorStats::new()),
            worker: None,
            clock,
            config,
        }
    }

    /// Replace the alert action derived from the options.
    #[must_use]
    pub fn with_alert_action(mut self, action: AlertAction) -> Self {
        self.action = action;
        self
    }

    /// Use a custom thread spawner for the detector thread.
    #[must_use]
    pub fn with_spawner(mut self, spawner: Arc<dyn ThreadSpawner>) -> Self {
        self.spawner = spawner;
        self
    }

    /// Measure heartbeats against a custom time source.
    ///
    /// Has no effect while running.
    #[must_use]
    pub fn with_time_source(mut self, time: Arc<dyn Clock>) -> Self {
        if self.is_running() {
            tracing::warn!("Ignoring time source change while running");
            return self;
        }
        self.clock = Arc::new(HeartbeatClock::new(time));
        self.heartbeat = HeartbeatSource::new(Arc::clone(&self.clock));
        self
    }

    /// Start watching with a pumped heartbeat on the current thread.
    ///
    /// No-op if already running.
    ///
    /// # Errors
    ///
    /// Returns an error if `heartbeat_interval` is zero or the detector
    /// thread cannot be spawned.
    pub fn start(&mut self, heartbeat_interval: Duration) -> WatchdogResult<()> {
        self.launch(heartbeat_interval, HeartbeatDriver::Pumped)
    }

    /// Start watching with heartbeats ticked by a task on the current tokio
    /// runtime. No-op if already running.
    ///
    /// # Errors
    ///
    /// Returns an error if `heartbeat_interval` is zero, no runtime is
    /// entered, or the detector thread cannot be spawned.
    #[cfg(feature = "tokio")]
    pub fn start_on_runtime(&mut self, heartbeat_interval: Duration) -> WatchdogResult<()> {
        self.launch(heartbeat_interval, HeartbeatDriver::Runtime)
    }

    /// Start with the configured heartbeat interval and a pumped heartbeat.
    ///
    /// # Errors
    ///
    /// See [`start`](Self::start).
    pub fn start_default(&mut self) -> WatchdogResult<()> {
        self.start(self.config.heartbeat_interval)
    }

    fn launch(&mut self, heartbeat_interval: Duration, driver: HeartbeatDriver) -> WatchdogResult<()> {
        if self.is_running() {
            tracing::debug!("UiWatchdog already running");
            return Ok(());
        }
        WatchdogError::ensure_positive("heartbeat_interval", heartbeat_interval)?;

        // Fresh counters per run: a detached thread from an earlier run keeps
        // writing only to its own.
        let stats = Arc::new(DetectorStats::new());
        let detector = StallDetector::new(
            Arc::clone(&self.clock),
            self.action.clone(),
            self.config.poll_interval,
            self.config.stall_threshold,
        )?
        .with_stats(Arc::clone(&stats));

        match driver {
            HeartbeatDriver::Pumped => self.heartbeat.start(heartbeat_interval)?,
            #[cfg(feature = "tokio")]
            HeartbeatDriver::Runtime => self.heartbeat.start_on_runtime(heartbeat_interval)?,
        }

        self.stats = stats;
        self.clock.reset();

        let (stop, token) = detector::stop_channel();
        // Never sent on; the detector thread drops the sender when it exits.
        let (exit_tx, exited) = channel::bounded::<()>(0);
        let work = Box::new(move || {
            let _exit_guard = exit_tx;
            detector.run(&token);
        });

        let handle = match self.spawner.spawn(&self.config.thread_name, work) {
            Ok(handle) => handle,
            Err(source) => {
                self.heartbeat.stop();
                tracing::error!(
                    thread = %self.config.thread_name,
                    error = %source,
                    "Failed to spawn detector thread"
                );
                return Err(WatchdogError::thread_spawn(&self.config.thread_name, source));
            }
        };

        self.worker = Some(Worker {
            stop,
            exited,
            handle,
        });
        tracing::debug!(
            heartbeat_interval_ms = heartbeat_interval.as_millis(),
            poll_interval_ms = self.config.poll_interval.as_millis(),
            stall_threshold_ms = self.config.stall_threshold.as_millis(),
            driver = ?driver,
            "UiWatchdog started"
        );
        Ok(())
    }

    /// Stop watching.
    ///
    /// Blocks for at most the configured join bound while the detector
    /// thread exits. No-op (returning [`JoinStatus::NotRunning`]) if
    /// already stopped.
    pub fn stop(&mut self) -> JoinStatus {
        let Some(worker) = self.worker.take() else {
            return JoinStatus::NotRunning;
        };

        self.heartbeat.stop();
        worker.stop.stop();

        let timeout = self.config.join_timeout;
        let status = match worker.exited.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    thread = %self.config.thread_name,
                    timeout_ms = timeout.as_millis(),
                    "Detector thread did not exit in time; detaching it"
                );
                JoinStatus::TimedOut
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => match worker.handle.join() {
                Ok(()) => JoinStatus::Joined,
                Err(payload) => {
                    tracing::error!(
                        thread = %self.config.thread_name,
                        panic = panic_message(payload.as_ref()),
                        "Detector thread panicked"
                    );
                    JoinStatus::Panicked
                }
            },
        };

        tracing::debug!(quit = status == JoinStatus::Joined, status = ?status, "Watch thread quit?");
        status
    }

    /// Drive the pumped heartbeat; call once per iteration of the monitored
    /// loop. Returns whether a heartbeat was emitted.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::WrongContext`] when called from a thread
    /// other than the one that started the watchdog.
    pub fn pump(&mut self) -> WatchdogResult<bool> {
        self.heartbeat.pump()
    }

    /// Emit a heartbeat immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if stopped or called from the wrong thread.
    pub fn beat(&self) -> WatchdogResult<()> {
        self.heartbeat.beat()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WatchdogState {
        if self.worker.is_some() {
            WatchdogState::Running
        } else {
            WatchdogState::Stopped
        }
    }

    /// Whether the watchdog is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == WatchdogState::Running
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &WatchdogConfig {
        &self.config
    }

    /// Detector statistics for the current (or most recent) run.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Time since the last heartbeat.
    #[must_use]
    pub fn elapsed_since_heartbeat(&self) -> Duration {
        self.clock.elapsed()
    }

    /// Heartbeats emitted over this watchdog's lifetime.
    #[must_use]
    pub fn heartbeat_ticks(&self) -> u64 {
        self.heartbeat.ticks()
    }
}

impl Default for UiWatchdog {
    fn default() -> Self {
        Self::new(AlertOptions::None)
    }
}

impl Drop for UiWatchdog {
    fn drop(&mut self) {
        if self.is_running() {
            let status = self.stop();
            tracing::debug!(status = ?status, "UiWatchdog dropped while running");
        }
        tracing::debug!("UiWatchdog destroyed");
    }
}

impl std::fmt::Debug for UiWatchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiWatchdog")
            .field("config", &self.config)
            .field("action", &self.action)
            .field("state", &self.state())
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}
