//! Console presentation of a [`ComparisonReport`].
//!
//! Everything is rendered to strings first and then logged line by line, so
//! the same text lands in the terminal and in the JSON log file.

use std::fmt::Write as _;

use tracing::info;

use crate::analysis::{ComparisonReport, Mode, REPORTED_PERCENTILE};

const CHART_WIDTH: usize = 40;

/// The score table: provider, accuracy score, relative time.
pub fn render_scores(report: &ComparisonReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<12} {:>15} {:>14} {:>8}", "Provider", "Accuracy Score", "Relative Time", "Rows");
    for score in &report.scores {
        let _ = writeln!(
            out,
            "{:<12} {:>15.2} {:>14.2} {:>8}",
            score.provider.display_name(),
            score.accuracy,
            score.relative_time,
            score.samples
        );
    }
    out
}

/// Mean and percentile lines per compared pair.
pub fn render_pair_lines(report: &ComparisonReport) -> Vec<String> {
    let mut lines = Vec::new();
    for entry in report.matrix.entries() {
        if report.mode.baseline().is_some_and(|base| entry.provider != base) {
            continue;
        }
        let provider = entry.provider.display_name();
        let reference = entry.reference.display_name();
        lines.push(format!(
            "Mean relative error of {provider} compared to {reference}: {:.2}%",
            entry.stats.mean_abs_error
        ));
        lines.push(format!(
            "{REPORTED_PERCENTILE}% of {provider} results differ from {reference} by less than {}%",
            entry.stats.p90_abs_error.trunc() as u64
        ));
    }
    lines
}

/// A horizontal bar chart, bars scaled to the largest value.
pub fn render_chart(title: &str, bars: &[(&str, f64)]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{title}");
    let max = bars
        .iter()
        .map(|&(_, v)| v)
        .fold(0.0_f64, f64::max);
    let label_width = bars.iter().map(|(l, _)| l.len()).max().unwrap_or(0);
    for &(label, value) in bars {
        let filled = if max > 0.0 {
            ((value.max(0.0) / max) * CHART_WIDTH as f64).round() as usize
        } else {
            0
        };
        let _ = writeln!(
            out,
            "{label:<label_width$} |{}{} {value:.2}",
            "█".repeat(filled),
            " ".repeat(CHART_WIDTH - filled.min(CHART_WIDTH))
        );
    }
    out
}

pub fn log_report(report: &ComparisonReport) {
    match report.mode {
        Mode::Baseline(base) => info!(baseline = %base, rows = report.rows, "Baseline comparison"),
        Mode::CrossValidation => info!(rows = report.rows, "Cross-validation comparison"),
    }

    if report.scores.is_empty() {
        info!("No provider could be scored");
    } else {
        for line in render_scores(report).lines() {
            info!("{line}");
        }
    }
    for line in render_pair_lines(report) {
        info!("{line}");
    }
}

pub fn log_charts(report: &ComparisonReport) {
    if report.scores.is_empty() {
        return;
    }
    let accuracy: Vec<(&str, f64)> = report
        .scores
        .iter()
        .map(|s| (s.provider.display_name(), s.accuracy))
        .collect();
    let relative: Vec<(&str, f64)> = report
        .scores
        .iter()
        .map(|s| (s.provider.display_name(), s.relative_time))
        .collect();

    for chart in [
        render_chart("Accuracy Score", &accuracy),
        render_chart("Relative Time", &relative),
    ] {
        for line in chart.lines() {
            info!("{line}");
        }
    }
}
