//! Console reporting for scenario results.

use std::time::Duration;

use crate::error::HarnessError;
use crate::scenario::{Outcome, Scenario, ScenarioReport};

/// ANSI color codes for terminal output
pub mod colors {
    pub const GREEN: &str = "\x1b[32m";
    pub const RED: &str = "\x1b[31m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const CYAN: &str = "\x1b[36m";
    pub const BOLD: &str = "\x1b[1m";
    pub const RESET: &str = "\x1b[0m";
}

pub fn print_header(title: &str) {
    println!("\n{}{}=== {title} ==={}\n", colors::BOLD, colors::CYAN, colors::RESET);
}

pub fn print_report(report: &ScenarioReport, verbose: bool) {
    match &report.outcome {
        Outcome::Pass(notes) => {
            println!("{}", status_line("PASS", colors::GREEN, report.scenario, report.duration));
            if verbose {
                for note in notes {
                    println!("    [ok] {note}");
                }
            }
        }
        Outcome::Warn(message) => {
            println!("{}", status_line("WARN", colors::YELLOW, report.scenario, report.duration));
            println!("    [warn] {message}");
        }
    }
}

pub fn print_failure(scenario: Scenario, duration: Duration, err: &HarnessError) {
    println!("{}", status_line("FAIL", colors::RED, scenario, duration));
    println!("    {err}");
}

/// Tally after every selected scenario has run.
pub fn print_summary(reports: &[ScenarioReport]) {
    let warned = reports
        .iter()
        .filter(|r| matches!(r.outcome, Outcome::Warn(_)))
        .count();
    println!(
        "\n{}{}All {} scenarios passed ({warned} with warnings){}",
        colors::BOLD,
        colors::GREEN,
        reports.len(),
        colors::RESET
    );
}

pub fn print_service_tail(lines: &[String]) {
    if lines.is_empty() {
        return;
    }
    println!(
        "\n{}--- last {} lines of service output ---{}",
        colors::YELLOW,
        lines.len(),
        colors::RESET
    );
    for line in lines {
        println!("    {line}");
    }
}

pub fn print_abort(err: &anyhow::Error) {
    println!(
        "\n{}{}Run aborted:{} {}",
        colors::BOLD,
        colors::RED,
        colors::RESET,
        abort_reason(err)
    );
}

/// Scenario failures were already printed by the runner; only name them.
fn abort_reason(err: &anyhow::Error) -> String {
    match err.downcast_ref::<HarnessError>().and_then(HarnessError::scenario) {
        Some(scenario) => format!("scenario {scenario} failed"),
        None => format!("{err:#}"),
    }
}

fn status_line(label: &str, color: &str, scenario: Scenario, duration: Duration) -> String {
    format!(
        "  {color}{label}{} {} ({:.2}s)",
        colors::RESET,
        scenario.name(),
        duration.as_secs_f64()
    )
}
