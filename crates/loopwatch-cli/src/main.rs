//! loopwatch - liveness watchdog driver
//!
//! Runs a scripted monitored loop under the watchdog, and prints or checks
//! watchdog configuration files.

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

mod config;
mod error;
mod output;
mod simulate;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use loopwatch::{AlertOptions, WatchdogConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{ConfigFormat, load_config, parse_config, render_config};
use crate::error::CliError;
use crate::simulate::{Driver, SimulationPlan, StallSpec};

#[derive(Parser)]
#[command(name = "loopwatch")]
#[command(about = "Detect when a monitored event loop stops processing work")]
#[command(version)]
struct Cli {
    /// Output in JSON format for machine parsing
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Watchdog configuration file (JSON or YAML)
    #[arg(short, long, global = true, env = "LOOPWATCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scripted loop under the watchdog and report what it saw
    Simulate {
        /// Loop iterations to run
        #[arg(short = 'n', long, default_value_t = 200)]
        iterations: u64,

        /// Work per iteration, in milliseconds
        #[arg(long, default_value_t = 10)]
        frame_ms: u64,

        /// Block the loop at an iteration, as ITERATION:MILLIS (repeatable)
        #[arg(long = "stall", value_name = "ITERATION:MILLIS")]
        stalls: Vec<StallSpec>,

        /// Heartbeat driver
        #[arg(long, value_enum, default_value_t = Driver::Pumped)]
        driver: Driver,

        /// Override the stall threshold, in milliseconds
        #[arg(long)]
        threshold_ms: Option<u64>,

        /// Break into an attached debugger on every alert
        #[arg(long)]
        debug_break: bool,

        /// Do not print alerts as they happen
        #[arg(long)]
        quiet: bool,
    },

    /// Print the effective configuration
    Defaults {
        /// Output format
        #[arg(long, value_enum, default_value_t = ConfigFormat::Json)]
        format: ConfigFormat,
    },

    /// Validate a configuration file
    Validate {
        /// File to validate
        path: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("loopwatch={log_level},loopwatch_cli={log_level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match execute_command(&cli) {
        Ok(code) => code,
        Err(e) => {
            if cli.json {
                output::print_error_json(&e);
            } else {
                output::print_error_human(&e);
            }
            let code = e.downcast_ref::<CliError>().map_or(1, CliError::exit_code);
            ExitCode::from(code)
        }
    }
}

fn execute_command(cli: &Cli) -> Result<ExitCode> {
    let mut config = load_config(cli.config.as_deref())?;

    match &cli.command {
        Commands::Simulate {
            iterations,
            frame_ms,
            stalls,
            driver,
            threshold_ms,
            debug_break,
            quiet,
        } => {
            apply_overrides(&mut config, *threshold_ms, *debug_break)?;
            let plan = SimulationPlan {
                iterations: *iterations,
                frame: Duration::from_millis(*frame_ms),
                stalls: if stalls.is_empty() {
                    simulate::default_stalls()
                } else {
                    stalls.clone()
                },
                driver: *driver,
                print_alerts: !quiet && !cli.json,
            };
            let report = simulate::run(config, &plan)?;
            output::print_report(&report, cli.json);
            Ok(if report.clean_shutdown {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(3)
            })
        }
        Commands::Defaults { format } => {
            let format = if cli.json { ConfigFormat::Json } else { *format };
            println!("{}", render_config(&config, format)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Validate { path } => {
            let text = std::fs::read_to_string(path).map_err(CliError::from)?;
            let parsed = parse_config(&text, ConfigFormat::from_path(path))?;
            if cli.json {
                output::print_json(&serde_json::json!({
                    "success": true,
                    "config": parsed,
                    "detection_latency_ms": parsed.detection_latency().as_millis(),
                }));
            } else {
                println!(
                    "{} is valid (alerts within {} ms of the last heartbeat)",
                    path.display(),
                    parsed.detection_latency().as_millis()
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn apply_overrides(
    config: &mut WatchdogConfig,
    threshold_ms: Option<u64>,
    debug_break: bool,
) -> Result<(), CliError> {
    if let Some(ms) = threshold_ms {
        config.stall_threshold = Duration::from_millis(ms);
    }
    if debug_break {
        config.options = AlertOptions::DebugBreak;
    }
    config
        .validate()
        .map_err(|e| CliError::InvalidConfiguration(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn parse_simulate_defaults() -> TestResult {
        let cli = Cli::try_parse_from(["loopwatch", "simulate"])?;
        assert!(!cli.json);
        assert_eq!(cli.verbose, 0);
        match cli.command {
            Commands::Simulate {
                iterations,
                frame_ms,
                stalls,
                driver,
                threshold_ms,
                debug_break,
                quiet,
            } => {
                assert_eq!(iterations, 200);
                assert_eq!(frame_ms, 10);
                assert!(stalls.is_empty());
                assert_eq!(driver, Driver::Pumped);
                assert!(threshold_ms.is_none());
                assert!(!debug_break);
                assert!(!quiet);
            }
            _ => return Err("expected simulate".into()),
        }
        Ok(())
    }

    #[test]
    fn parse_repeated_stalls() -> TestResult {
        let cli = Cli::try_parse_from([
            "loopwatch", "simulate", "--stall", "10:500", "--stall", "40:900", "--driver",
            "runtime",
        ])?;
        let Commands::Simulate { stalls, driver, .. } = cli.command else {
            return Err("expected simulate".into());
        };
        assert_eq!(stalls.len(), 2);
        assert_eq!(stalls.get(1).map(|s| s.iteration), Some(40));
        assert_eq!(driver, Driver::Runtime);
        Ok(())
    }

    #[test]
    fn parse_rejects_bad_stall() {
        let result = Cli::try_parse_from(["loopwatch", "simulate", "--stall", "oops"]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_global_flags_after_subcommand() -> TestResult {
        let cli = Cli::try_parse_from(["loopwatch", "defaults", "--json", "-vv"])?;
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        Ok(())
    }

    #[test]
    fn overrides_are_validated() {
        let mut config = WatchdogConfig::default();
        assert!(apply_overrides(&mut config, Some(0), false).is_err());

        let mut config = WatchdogConfig::default();
        assert!(apply_overrides(&mut config, Some(900), true).is_ok());
        assert_eq!(config.stall_threshold, Duration::from_millis(900));
        assert_eq!(config.options, AlertOptions::DebugBreak);
    }
}
