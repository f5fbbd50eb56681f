//! Time sources and the shared heartbeat stopwatch.
//!
//! [`HeartbeatClock`] is the only state shared between the monitored context
//! and the detector thread. It is an elapsed-time stopwatch with two
//! operations, [`HeartbeatClock::reset`] and [`HeartbeatClock::elapsed`],
//! both performed under a single internal guard.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Monotonic time source.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Time elapsed since this clock's epoch. Never decreases.
    fn now(&self) -> Duration;
}

/// Wall-independent clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Create a clock whose epoch is the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Manually advanced clock for simulated-time tests.
///
/// # Example
///
/// ```rust
/// use loopwatch::clock::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::new();
/// clock.advance(Duration::from_millis(250));
/// assert_eq!(clock.now(), Duration::from_millis(250));
/// ```
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    /// Create a clock at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let delta = duration_to_nanos(delta);
        let _previous = self
            .nanos
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_add(delta))
            });
    }

    /// Jump to an absolute time. Moving backwards is ignored.
    pub fn set(&self, now: Duration) {
        self.nanos.fetch_max(duration_to_nanos(now), Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Acquire))
    }
}

fn duration_to_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Shared "elapsed since last heartbeat" stopwatch.
///
/// The monitored context is the only writer ([`reset`](Self::reset)); the
/// detector thread is the only reader ([`elapsed`](Self::elapsed)). The guard
/// is held only for the duration of a single read or write.
pub struct HeartbeatClock {
    clock: Arc<dyn Clock>,
    last_beat: Mutex<Duration>,
}

impl HeartbeatClock {
    /// Create a stopwatch on the given time source, started now.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let last_beat = Mutex::new(clock.now());
        Self { clock, last_beat }
    }

    /// Create a stopwatch on a fresh [`MonotonicClock`].
    #[must_use]
    pub fn monotonic() -> Self {
        Self::new(Arc::new(MonotonicClock::new()))
    }

    /// Restart the stopwatch from zero.
    pub fn reset(&self) {
        let mut last = self.last_beat.lock();
        *last = self.clock.now();
    }

    /// Time elapsed since the last reset.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        let last = self.last_beat.lock();
        self.clock.now().saturating_sub(*last)
    }

    /// The underlying time source.
    #[must_use]
    pub fn time_source(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

impl Default for HeartbeatClock {
    fn default() -> Self {
        Self::monotonic()
    }
}

impl fmt::Debug for HeartbeatClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeartbeatClock")
            .field("clock", &self.clock)
            .field("elapsed", &self.elapsed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn manual() -> (Arc<ManualClock>, HeartbeatClock) {
        let clock = Arc::new(ManualClock::new());
        let heartbeat = HeartbeatClock::new(clock.clone());
        (clock, heartbeat)
    }

    #[test]
    fn test_elapsed_tracks_clock() {
        let (clock, heartbeat) = manual();
        assert_eq!(heartbeat.elapsed(), Duration::ZERO);

        clock.advance(Duration::from_millis(120));
        assert_eq!(heartbeat.elapsed(), Duration::from_millis(120));
    }

    #[test]
    fn test_reset_restarts_from_zero() {
        let (clock, heartbeat) = manual();
        clock.advance(Duration::from_millis(500));
        heartbeat.reset();
        assert_eq!(heartbeat.elapsed(), Duration::ZERO);

        clock.advance(Duration::from_millis(40));
        assert_eq!(heartbeat.elapsed(), Duration::from_millis(40));
    }

    #[test]
    fn test_manual_clock_never_goes_backwards() {
        let clock = ManualClock::new();
        clock.set(Duration::from_secs(2));
        clock.set(Duration::from_secs(1));
        assert_eq!(clock.now(), Duration::from_secs(2));

        clock.advance(Duration::MAX);
        assert_eq!(clock.now(), Duration::from_nanos(u64::MAX));
    }

    #[test]
    fn test_monotonic_clock_elapses() {
        let heartbeat = HeartbeatClock::monotonic();
        thread::sleep(Duration::from_millis(5));
        assert!(heartbeat.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn test_concurrent_reset_and_read() {
        let (clock, heartbeat) = manual();
        let heartbeat = Arc::new(heartbeat);

        let writer = {
            let heartbeat = heartbeat.clone();
            let clock = clock.clone();
            thread::spawn(move || {
                for _ in 0..1000 {
                    clock.advance(Duration::from_micros(10));
                    heartbeat.reset();
                }
            })
        };

        let mut max_seen = Duration::ZERO;
        for _ in 0..1000 {
            max_seen = max_seen.max(heartbeat.elapsed());
        }

        assert!(writer.join().is_ok(), "Writer thread should not panic");
        // A reader can observe at most one advance between resets.
        assert!(max_seen <= Duration::from_micros(10));
    }
}
