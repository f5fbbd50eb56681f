//! Mock alert sinks and thread spawners.
//!
//! Sinks record or misbehave on demand; [`CountingSpawner`] tracks how many
//! detector threads are alive so lifecycle tests can assert that at most one
//! exists at a time.

use loopwatch::{AlertError, AlertSink, StallAlert, ThreadSpawner, WorkerFn};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Sink that stores every alert it receives.
#[derive(Debug, Default)]
pub struct RecordingSink {
    alerts: Mutex<Vec<StallAlert>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn alerts(&self) -> Vec<StallAlert> {
        self.alerts.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.alerts.lock().len()
    }

    pub fn last(&self) -> Option<StallAlert> {
        self.alerts.lock().last().copied()
    }

    pub fn clear(&self) {
        self.alerts.lock().clear();
    }
}

impl AlertSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    fn on_stall(&self, alert: &StallAlert) -> Result<(), AlertError> {
        self.alerts.lock().push(*alert);
        Ok(())
    }
}

/// Sink that always fails, counting attempts.
#[derive(Debug, Default)]
pub struct FailingSink {
    attempts: AtomicUsize,
}

impl FailingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl AlertSink for FailingSink {
    fn name(&self) -> &str {
        "failing"
    }

    fn on_stall(&self, _alert: &StallAlert) -> Result<(), AlertError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(AlertError::new("failing", "sink unavailable"))
    }
}

/// Sink that blocks the detector thread for a fixed time on every alert.
///
/// Used to simulate a poll that never returns promptly, so the controller's
/// join bound can be exercised.
#[derive(Debug)]
pub struct BlockingSink {
    delay: Duration,
    entered: AtomicBool,
}

impl BlockingSink {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            entered: AtomicBool::new(false),
        })
    }

    /// Whether the sink has been entered at least once.
    pub fn entered(&self) -> bool {
        self.entered.load(Ordering::SeqCst)
    }
}

impl AlertSink for BlockingSink {
    fn name(&self) -> &str {
        "blocking"
    }

    fn on_stall(&self, _alert: &StallAlert) -> Result<(), AlertError> {
        self.entered.store(true, Ordering::SeqCst);
        thread::sleep(self.delay);
        Ok(())
    }
}

/// Spawner that counts live and total detector threads.
#[derive(Debug, Default)]
pub struct CountingSpawner {
    live: Arc<AtomicUsize>,
    max_live: Arc<AtomicUsize>,
    total: AtomicUsize,
}

impl CountingSpawner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Threads currently running.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Highest number of threads observed running at once.
    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    /// Threads spawned so far.
    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ThreadSpawner for CountingSpawner {
    fn spawn(&self, name: &str, work: WorkerFn) -> io::Result<JoinHandle<()>> {
        let now_live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(now_live, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);

        let guard = LiveGuard(Arc::clone(&self.live));
        // A failed spawn drops the closure, and with it the guard.
        thread::Builder::new().name(name.to_string()).spawn(move || {
            let _guard = guard;
            work();
        })
    }
}

/// Spawner whose thread discards the detector work and panics.
#[derive(Debug, Default)]
pub struct PanickingSpawner;

impl ThreadSpawner for PanickingSpawner {
    fn spawn(&self, name: &str, work: WorkerFn) -> io::Result<JoinHandle<()>> {
        thread::Builder::new().name(name.to_string()).spawn(move || {
            drop(work);
            panic!("detector thread crashed");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn alert(sequence: u64) -> StallAlert {
        StallAlert {
            elapsed: Duration::from_millis(400),
            threshold: Duration::from_millis(300),
            sequence,
        }
    }

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        assert!(sink.on_stall(&alert(1)).is_ok());
        assert!(sink.on_stall(&alert(2)).is_ok());
        assert_eq!(sink.count(), 2);
        assert_eq!(sink.last().map(|a| a.sequence), Some(2));
        sink.clear();
        assert_eq!(sink.count(), 0);
    }

    #[test]
    fn test_failing_sink_counts_attempts() {
        let sink = FailingSink::new();
        assert!(sink.on_stall(&alert(1)).is_err());
        assert_eq!(sink.attempts(), 1);
    }

    #[test]
    fn test_blocking_sink_blocks() {
        let sink = BlockingSink::new(Duration::from_millis(20));
        let start = Instant::now();
        assert!(sink.on_stall(&alert(1)).is_ok());
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert!(sink.entered());
    }

    #[test]
    fn test_counting_spawner_tracks_live_threads() {
        let spawner = CountingSpawner::new();
        let handle = spawner
            .spawn("counted", Box::new(|| thread::sleep(Duration::from_millis(10))))
            .unwrap();
        assert!(handle.join().is_ok());
        assert_eq!(spawner.live(), 0);
        assert_eq!(spawner.max_live(), 1);
        assert_eq!(spawner.total(), 1);
    }

    #[test]
    fn test_panicking_spawner_thread_panics() {
        let handle = PanickingSpawner.spawn("doomed", Box::new(|| {})).unwrap();
        assert!(handle.join().is_err());
    }
}
