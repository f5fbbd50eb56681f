//! Stall detection on the background thread.
//!
//! The detector polls the shared [`HeartbeatClock`] at a fixed cadence and
//! fires the [`AlertAction`] for every poll in which the elapsed time exceeds
//! the threshold. There is no debouncing: an ongoing stall produces one alert
//! per poll until heartbeats resume.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::alert::{AlertAction, StallAlert};
use crate::clock::HeartbeatClock;
use crate::error::{WatchdogError, WatchdogResult};
use crate::stats::DetectorStats;

/// Result of a single poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Elapsed time is within the threshold.
    Healthy {
        /// Time since the last heartbeat.
        elapsed: Duration,
    },
    /// The threshold was exceeded and an alert was raised.
    Stalled {
        /// The alert handed to the sink.
        alert: StallAlert,
        /// Whether the sink completed without error.
        delivered: bool,
    },
}

impl PollOutcome {
    /// Whether this poll raised an alert.
    #[must_use]
    pub fn is_stalled(&self) -> bool {
        matches!(self, Self::Stalled { .. })
    }

    /// Elapsed time observed by the poll.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        match self {
            Self::Healthy { elapsed } => *elapsed,
            Self::Stalled { alert, .. } => alert.elapsed,
        }
    }
}

/// Requests a running detector loop to exit. Safe to use from any thread.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Sender<()>,
}

impl StopHandle {
    /// Ask the detector to stop at its next poll boundary.
    pub fn stop(&self) {
        if self.tx.try_send(()).is_err() {
            tracing::trace!("Stop already requested or detector loop already exited");
        }
    }
}

/// Receiving side of a [`StopHandle`], owned by the detector loop.
#[derive(Debug)]
pub struct StopToken {
    rx: Receiver<()>,
}

/// Create a connected stop handle and token.
#[must_use]
pub fn stop_channel() -> (StopHandle, StopToken) {
    let (tx, rx) = channel::bounded(1);
    (StopHandle { tx }, StopToken { rx })
}

/// Periodic stall checker.
#[derive(Debug)]
pub struct StallDetector {
    clock: Arc<HeartbeatClock>,
    action: AlertAction,
    stats: Arc<DetectorStats>,
    poll_interval: Duration,
    threshold: Duration,
}

impl StallDetector {
    /// Create a detector.
    ///
    /// `threshold` should exceed the heartbeat interval; this is not checked
    /// here.
    ///
    /// # Errors
    ///
    /// Returns an error if `poll_interval` or `threshold` is zero.
    pub fn new(
        clock: Arc<HeartbeatClock>,
        action: AlertAction,
        poll_interval: Duration,
        threshold: Duration,
    ) -> WatchdogResult<Self> {
        WatchdogError::ensure_positive("poll_interval", poll_interval)?;
        WatchdogError::ensure_positive("stall_threshold", threshold)?;
        Ok(Self {
            clock,
            action,
            stats: Arc::new(DetectorStats::new()),
            poll_interval,
            threshold,
        })
    }

    /// Record into shared statistics instead of private ones.
    #[must_use]
    pub fn with_stats(mut self, stats: Arc<DetectorStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Statistics for this detector.
    #[must_use]
    pub fn stats(&self) -> &Arc<DetectorStats> {
        &self.stats
    }

    /// Poll interval.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Stall threshold.
    #[must_use]
    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Check the heartbeat clock once, alerting if the threshold is exceeded.
    pub fn poll(&self) -> PollOutcome {
        let elapsed = self.clock.elapsed();
        self.stats.record_poll(elapsed);

        if elapsed <= self.threshold {
            tracing::trace!(elapsed_ms = elapsed.as_millis(), "Heartbeat OK");
            return PollOutcome::Healthy { elapsed };
        }

        let alert = StallAlert {
            elapsed,
            threshold: self.threshold,
            sequence: self.stats.record_alert(elapsed),
        };
        let delivered = self.deliver(&alert);
        PollOutcome::Stalled { alert, delivered }
    }

    /// Poll at a fixed cadence until `token` is signalled or its handle is
    /// dropped. The stop request is observed at every poll boundary.
    pub fn run(&self, token: &StopToken) {
        tracing::debug!(
            poll_interval_ms = self.poll_interval.as_millis(),
            threshold_ms = self.threshold.as_millis(),
            sink = self.action.sink_name(),
            "Stall detector started"
        );

        let mut deadline = self.next_deadline(None);
        loop {
            let received = match deadline {
                Some(at) => token.rx.recv_deadline(at),
                None => token
                    .rx
                    .recv()
                    .map_err(|_disconnected| RecvTimeoutError::Disconnected),
            };
            match received {
                Err(RecvTimeoutError::Timeout) => {
                    let _outcome = self.poll();
                    deadline = self.next_deadline(deadline);
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let stats = self.stats.snapshot();
        tracing::debug!(
            polls = stats.polls,
            alerts = stats.alerts,
            alert_failures = stats.alert_failures,
            "Stall detector stopped"
        );
    }

    /// Next poll time after `previous`, or `None` when the interval does not
    /// fit in an `Instant`; the loop then only waits for stop.
    fn next_deadline(&self, previous: Option<Instant>) -> Option<Instant> {
        let now = Instant::now();
        let next = previous
            .and_then(|at| at.checked_add(self.poll_interval))
            // A slow poll skips missed slots rather than bursting.
            .filter(|at| *at > now)
            .or_else(|| now.checked_add(self.poll_interval));
        if next.is_none() {
            tracing::warn!(
                poll_interval_ms = self.poll_interval.as_millis(),
                "Poll interval out of range; detector will only wait for stop"
            );
        }
        next
    }

    fn deliver(&self, alert: &StallAlert) -> bool {
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.action.fire(alert)));
        match result {
            Ok(Ok(())) => true,
            Ok(Err(error)) => {
                self.stats.record_alert_failure();
                tracing::error!(
                    sink = self.action.sink_name(),
                    error = %error,
                    elapsed_ms = alert.elapsed_ms(),
                    sequence = alert.sequence,
                    "Alert sink failed"
                );
                false
            }
            Err(payload) => {
                self.stats.record_alert_failure();
                tracing::error!(
                    sink = self.action.sink_name(),
                    panic = panic_message(payload.as_ref()),
                    elapsed_ms = alert.elapsed_ms(),
                    sequence = alert.sequence,
                    "Alert sink panicked"
                );
                false
            }
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
