//! Scripted monitored loop.
//!
//! Runs a pumped loop on the calling thread under a [`UiWatchdog`] and
//! injects blocking stalls at chosen iterations, so alert behaviour can be
//! observed end to end.

use std::fmt;
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};

use colored::Colorize;
use loopwatch::{
    AlertAction, AlertError, AlertOptions, AlertSink, JoinStatus, StallAlert, StatsSnapshot,
    UiWatchdog, WatchdogConfig,
};
use serde::Serialize;

use crate::error::CliError;

/// Block the loop for `duration` at iteration `iteration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StallSpec {
    pub iteration: u64,
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
}

impl FromStr for StallSpec {
    type Err = CliError;

    /// Parse `ITERATION:MILLIS`, e.g. `20:750`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| CliError::InvalidStall {
            spec: s.to_string(),
            reason: reason.to_string(),
        };
        let (iteration, millis) = s
            .split_once(':')
            .ok_or_else(|| invalid("expected ITERATION:MILLIS"))?;
        let iteration = iteration
            .trim()
            .parse()
            .map_err(|_err| invalid("iteration is not a number"))?;
        let millis: u64 = millis
            .trim()
            .parse()
            .map_err(|_err| invalid("duration is not a number of milliseconds"))?;
        if millis == 0 {
            return Err(invalid("duration must be greater than 0"));
        }
        Ok(Self {
            iteration,
            duration: Duration::from_millis(millis),
        })
    }
}

impl fmt::Display for StallSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.iteration, self.duration.as_millis())
    }
}

fn as_millis<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
}

/// How the simulated loop produces heartbeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Driver {
    /// The loop pumps the watchdog once per frame.
    #[default]
    Pumped,
    /// A task on a current-thread tokio runtime ticks the heartbeat.
    Runtime,
}

/// Parameters of one simulation run.
#[derive(Debug, Clone)]
pub struct SimulationPlan {
    pub iterations: u64,
    pub frame: Duration,
    pub stalls: Vec<StallSpec>,
    pub driver: Driver,
    pub print_alerts: bool,
}

impl SimulationPlan {
    fn stall_at(&self, iteration: u64) -> Option<Duration> {
        self.stalls
            .iter()
            .filter(|stall| stall.iteration == iteration)
            .map(|stall| stall.duration)
            .reduce(Duration::saturating_add)
    }
}

/// Outcome of a simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub iterations: u64,
    pub driver: String,
    pub injected_stalls: Vec<StallSpec>,
    pub heartbeat_ticks: u64,
    pub join_status: String,
    pub clean_shutdown: bool,
    pub wall_time_ms: u64,
    pub stats: StatsSnapshot,
}

/// Prints each alert to stderr as it is raised.
#[derive(Debug)]
struct ConsoleSink;

impl AlertSink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    fn on_stall(&self, alert: &StallAlert) -> Result<(), AlertError> {
        eprintln!(
            "{} loop blocked for {} ms (threshold {} ms, alert #{})",
            "STALL".yellow().bold(),
            alert.elapsed_ms(),
            alert.threshold.as_millis(),
            alert.sequence
        );
        Ok(())
    }
}

/// Run the plan on the current thread.
pub fn run(config: WatchdogConfig, plan: &SimulationPlan) -> Result<SimulationReport, CliError> {
    let heartbeat_interval = config.heartbeat_interval;
    let debug_break = config.options == AlertOptions::DebugBreak;
    let mut watchdog = UiWatchdog::with_config(config)?;
    if plan.print_alerts && !debug_break {
        watchdog = watchdog.with_alert_action(AlertAction::custom(ConsoleSink));
    }

    tracing::info!(
        iterations = plan.iterations,
        frame_ms = plan.frame.as_millis(),
        driver = ?plan.driver,
        stalls = plan.stalls.len(),
        "Starting simulated loop"
    );

    let started = Instant::now();
    let status = match plan.driver {
        Driver::Pumped => pumped_loop(&mut watchdog, heartbeat_interval, plan)?,
        Driver::Runtime => runtime_loop(&mut watchdog, heartbeat_interval, plan)?,
    };
    let wall_time = started.elapsed();

    if status == JoinStatus::TimedOut {
        tracing::warn!("Detector thread was detached at shutdown");
    }

    Ok(SimulationReport {
        iterations: plan.iterations,
        driver: format!("{:?}", plan.driver).to_lowercase(),
        injected_stalls: plan.stalls.clone(),
        heartbeat_ticks: watchdog.heartbeat_ticks(),
        join_status: format!("{status:?}"),
        clean_shutdown: status.is_clean(),
        wall_time_ms: u64::try_from(wall_time.as_millis()).unwrap_or(u64::MAX),
        stats: watchdog.stats(),
    })
}

fn pumped_loop(
    watchdog: &mut UiWatchdog,
    heartbeat_interval: Duration,
    plan: &SimulationPlan,
) -> Result<JoinStatus, CliError> {
    watchdog.start(heartbeat_interval)?;
    for iteration in 0..plan.iterations {
        if let Some(stall) = plan.stall_at(iteration) {
            tracing::info!(iteration, stall_ms = stall.as_millis(), "Injecting stall");
            thread::sleep(stall);
        }
        thread::sleep(plan.frame);
        watchdog.pump()?;
    }
    Ok(watchdog.stop())
}

fn runtime_loop(
    watchdog: &mut UiWatchdog,
    heartbeat_interval: Duration,
    plan: &SimulationPlan,
) -> Result<JoinStatus, CliError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    runtime.block_on(async {
        watchdog.start_on_runtime(heartbeat_interval)?;
        for iteration in 0..plan.iterations {
            if let Some(stall) = plan.stall_at(iteration) {
                tracing::info!(iteration, stall_ms = stall.as_millis(), "Injecting stall");
                // Blocks the runtime, starving the heartbeat task.
                thread::sleep(stall);
            }
            tokio::time::sleep(plan.frame).await;
        }
        Ok::<_, CliError>(watchdog.stop())
    })
}

/// Default plan: two seconds of 10 ms frames with one 800 ms stall.
pub fn default_stalls() -> Vec<StallSpec> {
    vec![StallSpec {
        iteration: 100,
        duration: Duration::from_millis(800),
    }]
}
