//! Detector statistics.
//!
//! Counters are updated by the detector thread and read from any thread.
//! All operations are single atomic instructions with `Relaxed` ordering;
//! values are eventually consistent, which is all a metrics reader needs.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Point-in-time copy of [`DetectorStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Polls performed.
    pub polls: u64,
    /// Polls in which the threshold was exceeded.
    pub alerts: u64,
    /// Alerts whose sink returned an error or panicked.
    pub alert_failures: u64,
    /// Largest elapsed-since-heartbeat value observed by any poll (ms).
    pub longest_elapsed_ms: u64,
    /// Elapsed value carried by the most recent alert (ms).
    pub last_alert_elapsed_ms: u64,
}

impl StatsSnapshot {
    /// Fraction of polls that raised an alert, in percent.
    ///
    /// Returns 0.0 if no polls have been recorded.
    #[must_use]
    #[expect(
        clippy::cast_precision_loss,
        reason = "poll counts stay far below 2^52"
    )]
    pub fn alert_rate(&self) -> f64 {
        if self.polls == 0 {
            0.0
        } else {
            (self.alerts as f64 / self.polls as f64) * 100.0
        }
    }

    /// Longest observed time without a heartbeat.
    #[must_use]
    pub fn longest_elapsed(&self) -> Duration {
        Duration::from_millis(self.longest_elapsed_ms)
    }
}

/// Lock-free detector counters.
#[derive(Debug, Default)]
pub struct DetectorStats {
    polls: AtomicU64,
    alerts: AtomicU64,
    alert_failures: AtomicU64,
    longest_elapsed_ms: AtomicU64,
    last_alert_elapsed_ms: AtomicU64,
}

impl DetectorStats {
    /// Create zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            polls: AtomicU64::new(0),
            alerts: AtomicU64::new(0),
            alert_failures: AtomicU64::new(0),
            longest_elapsed_ms: AtomicU64::new(0),
            last_alert_elapsed_ms: AtomicU64::new(0),
        }
    }

    /// Record one poll and the elapsed value it observed.
    pub fn record_poll(&self, elapsed: Duration) {
        self.polls.fetch_add(1, Ordering::Relaxed);
        self.longest_elapsed_ms
            .fetch_max(to_millis(elapsed), Ordering::Relaxed);
    }

    /// Record an alert. Returns the 1-based alert sequence number.
    pub fn record_alert(&self, elapsed: Duration) -> u64 {
        self.last_alert_elapsed_ms
            .store(to_millis(elapsed), Ordering::Relaxed);
        self.alerts.fetch_add(1, Ordering::Relaxed).saturating_add(1)
    }

    /// Record a failed alert delivery.
    pub fn record_alert_failure(&self) {
        self.alert_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of alerts raised so far.
    #[must_use]
    pub fn alerts(&self) -> u64 {
        self.alerts.load(Ordering::Relaxed)
    }

    /// Read all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            polls: self.polls.load(Ordering::Relaxed),
            alerts: self.alerts.load(Ordering::Relaxed),
            alert_failures: self.alert_failures.load(Ordering::Relaxed),
            longest_elapsed_ms: self.longest_elapsed_ms.load(Ordering::Relaxed),
            last_alert_elapsed_ms: self.last_alert_elapsed_ms.load(Ordering::Relaxed),
        }
    }

    /// Zero all counters.
    pub fn reset(&self) {
        self.polls.store(0, Ordering::Relaxed);
        self.alerts.store(0, Ordering::Relaxed);
        self.alert_failures.store(0, Ordering::Relaxed);
        self.longest_elapsed_ms.store(0, Ordering::Relaxed);
        self.last_alert_elapsed_ms.store(0, Ordering::Relaxed);
    }
}

fn to_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_stats_are_zero() {
        let stats = DetectorStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
        assert!(stats.snapshot().alert_rate().abs() < f64::EPSILON);
    }

    #[test]
    fn test_record_poll_tracks_longest() {
        let stats = DetectorStats::new();
        stats.record_poll(Duration::from_millis(120));
        stats.record_poll(Duration::from_millis(640));
        stats.record_poll(Duration::from_millis(30));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.polls, 3);
        assert_eq!(snapshot.longest_elapsed(), Duration::from_millis(640));
    }

    #[test]
    fn test_record_alert_sequence() {
        let stats = DetectorStats::new();
        assert_eq!(stats.record_alert(Duration::from_millis(310)), 1);
        assert_eq!(stats.record_alert(Duration::from_millis(510)), 2);
        stats.record_alert_failure();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.alerts, 2);
        assert_eq!(snapshot.alert_failures, 1);
        assert_eq!(snapshot.last_alert_elapsed_ms, 510);
    }

    #[test]
    fn test_alert_rate_and_reset() {
        let stats = DetectorStats::new();
        for i in 0..4u64 {
            stats.record_poll(Duration::from_millis(i * 100));
        }
        stats.record_alert(Duration::from_millis(300));
        assert!((stats.snapshot().alert_rate() - 25.0).abs() < 0.01);

        stats.reset();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }
}
