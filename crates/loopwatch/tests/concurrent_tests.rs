//! Tests for thread-safety of the shared heartbeat clock and the detector.

use loopwatch::prelude::*;
use loopwatch::stop_channel;
use loopwatch_test_helpers::prelude::*;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_concurrent_resets_and_reads() -> TestResult {
    let clock = Arc::new(HeartbeatClock::monotonic());
    let writer = {
        let clock = Arc::clone(&clock);
        thread::spawn(move || {
            for _ in 0..10_000 {
                clock.reset();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let clock = Arc::clone(&clock);
            thread::spawn(move || {
                let mut longest = Duration::ZERO;
                for _ in 0..10_000 {
                    longest = longest.max(clock.elapsed());
                }
                longest
            })
        })
        .collect();

    assert!(writer.join().is_ok(), "Writer thread should not panic");
    for reader in readers {
        let longest = reader.join();
        assert!(longest.is_ok(), "Reader thread should not panic");
        if let Ok(longest) = longest {
            assert!(longest < Duration::from_secs(1));
        }
    }
    Ok(())
}

#[test]
fn test_detector_thread_with_live_heartbeats() -> TestResult {
    let clock = Arc::new(HeartbeatClock::monotonic());
    let sink = RecordingSink::new();
    let detector = StallDetector::new(
        clock.clone(),
        AlertAction::Custom(sink.clone()),
        Duration::from_millis(20),
        Duration::from_millis(100),
    )?;
    let stats = detector.stats().clone();
    let (stop, token) = stop_channel();
    let handle = thread::spawn(move || detector.run(&token));

    let mut source = HeartbeatSource::new(clock);
    source.start(Duration::from_millis(10))?;
    let deadline = Instant::now() + Duration::from_millis(300);
    while Instant::now() < deadline {
        source.pump()?;
        thread::sleep(Duration::from_millis(2));
    }
    stop.stop();

    assert!(handle.join().is_ok(), "Detector thread should not panic");
    assert_eq!(sink.count(), 0);
    assert!(stats.snapshot().polls >= 5);
    assert!(source.ticks() >= 10);
    Ok(())
}

#[test]
fn test_independent_watchdogs_in_parallel() -> TestResult {
    let handles: Vec<_> = (0..4u64)
        .map(|i| {
            thread::spawn(move || -> Result<(u64, StatsSnapshot), WatchdogError> {
                let config = WatchdogConfig::builder()
                    .poll_interval(Duration::from_millis(10))
                    .stall_threshold(Duration::from_millis(40))
                    .thread_name(format!("loopwatch-detector-{i}"))
                    .build()?;
                let mut watchdog = UiWatchdog::with_config(config)?;
                watchdog.start(Duration::from_millis(5))?;

                // Even-numbered loops stay responsive, odd ones block.
                let deadline = Instant::now() + Duration::from_millis(200);
                while Instant::now() < deadline {
                    if i % 2 == 0 {
                        watchdog.pump()?;
                    }
                    thread::sleep(Duration::from_millis(1));
                }
                let status = watchdog.stop();
                assert_eq!(status, JoinStatus::Joined);
                Ok((i, watchdog.stats()))
            })
        })
        .collect();

    for handle in handles {
        let joined = handle.join();
        assert!(joined.is_ok(), "Thread should not panic");
        if let Ok(result) = joined {
            let (i, stats) = result?;
            if i % 2 == 0 {
                assert_eq!(stats.alerts, 0, "watchdog {i} alerted");
            } else {
                assert!(stats.alerts > 0, "watchdog {i} missed the stall");
            }
        }
    }
    Ok(())
}

#[test]
fn test_stop_from_other_thread_while_polling() -> TestResult {
    let clock = Arc::new(HeartbeatClock::monotonic());
    let detector = StallDetector::new(
        clock,
        AlertAction::LogOnly,
        Duration::from_millis(1),
        Duration::from_millis(1),
    )?;
    let (stop, token) = stop_channel();
    let worker = thread::spawn(move || detector.run(&token));

    let stoppers: Vec<_> = (0..4)
        .map(|_| {
            let stop = stop.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                stop.stop();
            })
        })
        .collect();
    for stopper in stoppers {
        assert!(stopper.join().is_ok(), "Stopper thread should not panic");
    }
    assert!(worker.join().is_ok(), "Detector thread should not panic");
    Ok(())
}
