//! Output formatting for CLI commands

use anyhow::Error;
use colored::Colorize;
use serde::Serialize;
use serde_json::json;

use crate::simulate::SimulationReport;

/// Print any serializable value as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("Failed to format output as JSON: {e}"),
    }
}

/// Print error in JSON format
pub fn print_error_json(error: &Error) {
    print_json(&json!({
        "success": false,
        "error": {
            "message": error.to_string(),
        }
    }));
}

/// Print error in human-readable format
pub fn print_error_human(error: &Error) {
    eprintln!("{} {}", "Error:".red().bold(), error);

    let mut source = error.source();
    while let Some(err) = source {
        eprintln!("  {} {}", "Caused by:".yellow(), err);
        source = err.source();
    }
}

/// Print a simulation report.
pub fn print_report(report: &SimulationReport, json: bool) {
    if json {
        print_json(&json!({
            "success": true,
            "report": report,
        }));
        return;
    }

    let status = if report.clean_shutdown {
        report.join_status.green()
    } else {
        report.join_status.red()
    };
    let stats = &report.stats;

    println!("{}", "Simulation summary".bold());
    println!("  Driver:           {}", report.driver);
    println!("  Iterations:       {}", report.iterations);
    println!("  Injected stalls:  {}", report.injected_stalls.len());
    println!("  Heartbeats:       {}", report.heartbeat_ticks);
    println!("  Polls:            {}", stats.polls);
    println!(
        "  Alerts:           {}",
        if stats.alerts == 0 {
            stats.alerts.to_string().green()
        } else {
            stats.alerts.to_string().yellow()
        }
    );
    println!("  Alert failures:   {}", stats.alert_failures);
    println!("  Longest gap:      {} ms", stats.longest_elapsed_ms);
    println!("  Alert rate:       {:.1}%", stats.alert_rate());
    println!("  Wall time:        {} ms", report.wall_time_ms);
    println!("  Detector thread:  {status}");
}
