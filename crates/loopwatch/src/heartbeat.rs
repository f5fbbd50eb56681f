//! Heartbeat emission on the monitored context.
//!
//! A [`HeartbeatSource`] is bound to the thread that starts it. Ticks are
//! produced either by the monitored loop calling [`HeartbeatSource::pump`]
//! once per iteration, or (with the `tokio` feature) by a task on the
//! monitored context's tokio runtime. Either way a tick only happens while
//! the monitored loop is actually running, which is what makes a missing
//! tick meaningful.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};
use std::time::Duration;

use crate::clock::HeartbeatClock;
use crate::error::{WatchdogError, WatchdogResult};

/// How ticks are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatDriver {
    /// The monitored loop calls [`HeartbeatSource::pump`].
    Pumped,
    /// A task on the monitored context's tokio runtime ticks the clock.
    #[cfg(feature = "tokio")]
    Runtime,
}

#[derive(Debug)]
struct Schedule {
    owner: ThreadId,
    interval: Duration,
    next_due: Duration,
    #[cfg(feature = "tokio")]
    task: Option<tokio::task::JoinHandle<()>>,
}

impl Schedule {
    fn driver(&self) -> HeartbeatDriver {
        #[cfg(feature = "tokio")]
        if self.task.is_some() {
            return HeartbeatDriver::Runtime;
        }
        HeartbeatDriver::Pumped
    }
}

/// Emits heartbeats from the monitored context into a [`HeartbeatClock`].
#[derive(Debug)]
pub struct HeartbeatSource {
    clock: Arc<HeartbeatClock>,
    ticks: Arc<AtomicU64>,
    schedule: Option<Schedule>,
}

impl HeartbeatSource {
    /// Create a stopped source writing to `clock`.
    #[must_use]
    pub fn new(clock: Arc<HeartbeatClock>) -> Self {
        Self {
            clock,
            ticks: Arc::new(AtomicU64::new(0)),
            schedule: None,
        }
    }

    /// Bind to the current thread and start a pumped schedule.
    ///
    /// Starting an already running source is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if `interval` is zero.
    pub fn start(&mut self, interval: Duration) -> WatchdogResult<()> {
        WatchdogError::ensure_positive("heartbeat_interval", interval)?;
        if self.is_running() {
            tracing::debug!("Heartbeat source already running");
            return Ok(());
        }

        let next_due = self.clock.time_source().now().saturating_add(interval);
        self.schedule = Some(Schedule {
            owner: thread::current().id(),
            interval,
            next_due,
            #[cfg(feature = "tokio")]
            task: None,
        });
        tracing::debug!(interval_ms = interval.as_millis(), "Heartbeat source started");
        Ok(())
    }

    /// Bind to the current thread and tick from a task on its tokio runtime.
    ///
    /// The runtime should be a current-thread runtime driven by the monitored
    /// context; on a multi-threaded runtime the task may run elsewhere and
    /// keep ticking while the monitored thread is blocked.
    ///
    /// # Errors
    ///
    /// Returns an error if `interval` is zero or no runtime is entered.
    #[cfg(feature = "tokio")]
    pub fn start_on_runtime(&mut self, interval: Duration) -> WatchdogResult<()> {
        WatchdogError::ensure_positive("heartbeat_interval", interval)?;
        if self.is_running() {
            tracing::debug!("Heartbeat source already running");
            return Ok(());
        }

        let handle =
            tokio::runtime::Handle::try_current().map_err(|_err| WatchdogError::NoRuntime)?;
        let clock = Arc::clone(&self.clock);
        let ticks = Arc::clone(&self.ticks);
        let task = handle.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                clock.reset();
                ticks.fetch_add(1, Ordering::Relaxed);
            }
        });

        self.schedule = Some(Schedule {
            owner: thread::current().id(),
            interval,
            next_due: Duration::ZERO,
            task: Some(task),
        });
        tracing::debug!(
            interval_ms = interval.as_millis(),
            "Heartbeat source started on runtime"
        );
        Ok(())
    }

    /// Drive a pumped schedule; call once per iteration of the monitored loop.
    ///
    /// Returns whether a heartbeat was emitted. A stopped or runtime-driven
    /// source never emits from here.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::WrongContext`] when called from a thread other
    /// than the one that started the source.
    pub fn pump(&mut self) -> WatchdogResult<bool> {
        let Some(schedule) = self.schedule.as_mut() else {
            return Ok(false);
        };
        check_context(schedule.owner)?;
        if schedule.driver() != HeartbeatDriver::Pumped {
            return Ok(false);
        }

        let now = self.clock.time_source().now();
        if now < schedule.next_due {
            return Ok(false);
        }
        schedule.next_due = now.saturating_add(schedule.interval);
        self.tick();
        Ok(true)
    }

    /// Emit a heartbeat immediately, outside the schedule.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is stopped or called from the wrong
    /// thread.
    pub fn beat(&self) -> WatchdogResult<()> {
        let schedule = self.schedule.as_ref().ok_or(WatchdogError::NotRunning)?;
        check_context(schedule.owner)?;
        self.tick();
        Ok(())
    }

    /// Cancel future ticks. The last recorded heartbeat is kept.
    pub fn stop(&mut self) {
        let Some(schedule) = self.schedule.take() else {
            return;
        };
        #[cfg(feature = "tokio")]
        if let Some(task) = &schedule.task {
            task.abort();
        }
        tracing::debug!(
            interval_ms = schedule.interval.as_millis(),
            ticks = self.ticks(),
            "Heartbeat source stopped"
        );
    }

    /// Whether a schedule is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.schedule.is_some()
    }

    /// Active driver, if running.
    #[must_use]
    pub fn driver(&self) -> Option<HeartbeatDriver> {
        self.schedule.as_ref().map(Schedule::driver)
    }

    /// Active heartbeat interval, if running.
    #[must_use]
    pub fn interval(&self) -> Option<Duration> {
        self.schedule.as_ref().map(|s| s.interval)
    }

    /// Thread the source is bound to, if running.
    #[must_use]
    pub fn owner(&self) -> Option<ThreadId> {
        self.schedule.as_ref().map(|s| s.owner)
    }

    /// Heartbeats emitted over the lifetime of this source.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    fn tick(&self) {
        self.clock.reset();
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }
}

impl Drop for HeartbeatSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn check_context(owner: ThreadId) -> WatchdogResult<()> {
    let actual = thread::current().id();
    if actual == owner {
        Ok(())
    } else {
        Err(WatchdogError::wrong_context(owner, actual))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn source() -> (Arc<ManualClock>, Arc<HeartbeatClock>, HeartbeatSource) {
        let time = Arc::new(ManualClock::new());
        let clock = Arc::new(HeartbeatClock::new(time.clone()));
        let source = HeartbeatSource::new(clock.clone());
        (time, clock, source)
    }

    #[test]
    fn test_pump_ticks_on_interval() -> WatchdogResult<()> {
        let (time, clock, mut source) = source();
        source.start(Duration::from_millis(100))?;

        time.advance(Duration::from_millis(60));
        assert!(!source.pump()?);
        assert_eq!(clock.elapsed(), Duration::from_millis(60));

        time.advance(Duration::from_millis(40));
        assert!(source.pump()?);
        assert_eq!(clock.elapsed(), Duration::ZERO);
        assert_eq!(source.ticks(), 1);

        time.advance(Duration::from_millis(99));
        assert!(!source.pump()?);
        Ok(())
    }

    #[test]
    fn test_late_pump_does_not_burst() -> WatchdogResult<()> {
        let (time, _clock, mut source) = source();
        source.start(Duration::from_millis(100))?;

        time.advance(Duration::from_millis(1000));
        assert!(source.pump()?);
        assert!(!source.pump()?);
        assert_eq!(source.ticks(), 1);
        Ok(())
    }

    #[test]
    fn test_start_is_idempotent() -> WatchdogResult<()> {
        let (_time, _clock, mut source) = source();
        source.start(Duration::from_millis(100))?;
        source.start(Duration::from_millis(5))?;
        assert_eq!(source.interval(), Some(Duration::from_millis(100)));
        assert_eq!(source.driver(), Some(HeartbeatDriver::Pumped));
        Ok(())
    }

    #[test]
    fn test_zero_interval_rejected() {
        let (_time, _clock, mut source) = source();
        let result = source.start(Duration::ZERO);
        assert!(matches!(result, Err(WatchdogError::InvalidConfiguration(_))));
        assert!(!source.is_running());
    }

    #[test]
    fn test_stop_keeps_last_heartbeat() -> WatchdogResult<()> {
        let (time, clock, mut source) = source();
        source.start(Duration::from_millis(10))?;
        time.advance(Duration::from_millis(10));
        assert!(source.pump()?);

        source.stop();
        assert!(!source.is_running());
        time.advance(Duration::from_millis(70));
        assert!(!source.pump()?);
        assert_eq!(clock.elapsed(), Duration::from_millis(70));
        assert!(matches!(source.beat(), Err(WatchdogError::NotRunning)));
        Ok(())
    }

    #[test]
    fn test_wrong_context_is_rejected() -> WatchdogResult<()> {
        let (_time, _clock, mut source) = source();
        source.start(Duration::from_millis(100))?;
        source.beat()?;

        let handle = thread::spawn(move || {
            let beat = source.beat();
            let pump = source.pump();
            (beat, pump)
        });
        let joined = handle.join();
        assert!(joined.is_ok(), "Thread should not panic");
        if let Ok((beat, pump)) = joined {
            assert!(matches!(beat, Err(WatchdogError::WrongContext { .. })));
            assert!(matches!(pump, Err(WatchdogError::WrongContext { .. })));
        }
        Ok(())
    }

    #[cfg(feature = "tokio")]
    #[test]
    fn test_runtime_driver_requires_runtime() {
        let (_time, _clock, mut source) = source();
        let result = source.start_on_runtime(Duration::from_millis(10));
        assert!(matches!(result, Err(WatchdogError::NoRuntime)));
    }

    #[cfg(feature = "tokio")]
    #[tokio::test]
    async fn test_runtime_driver_stops_ticking_when_blocked() -> WatchdogResult<()> {
        let clock = Arc::new(HeartbeatClock::monotonic());
        let mut source = HeartbeatSource::new(clock.clone());
        source.start_on_runtime(Duration::from_millis(10))?;
        assert_eq!(source.driver(), Some(HeartbeatDriver::Runtime));

        tokio::time::sleep(Duration::from_millis(55)).await;
        assert!(source.ticks() >= 3);

        // Block the current-thread runtime: no task can tick.
        std::thread::sleep(Duration::from_millis(100));
        assert!(clock.elapsed() >= Duration::from_millis(90));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(clock.elapsed() < Duration::from_millis(50));

        // Pumping a runtime-driven source is a no-op.
        assert!(!source.pump()?);
        source.stop();
        Ok(())
    }
}
