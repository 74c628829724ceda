//! CLI entry point for the drive time comparison tool.
//!
//! Collects travel times for every route and departure from the enabled
//! providers, writes them to a CSV, and reports how far the providers agree.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use chrono::Utc;
use clap::Parser;
use drive_time_comparison::analysis::outliers::{
    OutlierConfig, detect_outliers, filter_outliers, log_outliers,
};
use drive_time_comparison::analysis::snapping::{categorize, count_cases, log_case_summary};
use drive_time_comparison::analysis::{ComparisonEngine, Mode};
use drive_time_comparison::config::ProvidersConfig;
use drive_time_comparison::dataset::Dataset;
use drive_time_comparison::departure::{DepartureSpec, DepartureTimes};
use drive_time_comparison::fetch::{BasicClient, SharedClient};
use drive_time_comparison::input::read_route_pairs;
use drive_time_comparison::orchestrator::{FetchOrchestrator, FetchReport, ProviderLane, RetryPolicy};
use drive_time_comparison::output::{RunSummary, print_json, read_dataset, write_dataset, write_summary};
use drive_time_comparison::report::{log_charts, log_report};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "drive_time_comparison")]
#[command(about = "Compare driving travel times across routing providers", long_about = None)]
struct Cli {
    /// CSV with `origin` and `destination` columns, or a previous output
    /// when --skip-data-gathering is set
    #[arg(long)]
    input: String,

    /// CSV file to write travel times and error percentages to
    #[arg(long)]
    output: String,

    /// Departure date (YYYY-MM-DD)
    #[arg(long, required_unless_present = "skip_data_gathering")]
    date: Option<String>,

    /// Departure times, separated by `,` (HH:MM, HH:MM)
    #[arg(long, conflicts_with_all = ["start_time", "end_time", "interval"])]
    departure_times: Option<String>,

    /// First departure of a window (HH:MM)
    #[arg(long, requires_all = ["end_time", "interval"])]
    start_time: Option<String>,

    /// Last departure of a window (HH:MM), included only if the interval divides the window
    #[arg(long, requires = "start_time")]
    end_time: Option<String>,

    /// Minutes between departures in a window
    #[arg(long, requires = "start_time")]
    interval: Option<u32>,

    /// Non-abbreviated time zone identifier, e.g. Europe/London
    #[arg(long, required_unless_present = "skip_data_gathering")]
    time_zone_id: Option<String>,

    /// Path to the provider config file
    #[arg(long, default_value = "./config.json")]
    config: String,

    /// Score every provider against this one instead of cross-validating
    #[arg(long, value_name = "PROVIDER")]
    baseline: Option<String>,

    /// Read already gathered travel times from --input instead of fetching
    #[arg(long, default_value_t = false)]
    skip_data_gathering: bool,

    /// Do not draw the summary charts
    #[arg(long, default_value_t = false)]
    skip_plotting: bool,

    /// Drop rows where a provider is at least this many times off the row median (> 1)
    #[arg(long, value_name = "RATIO")]
    outlier_ratio: Option<f64>,

    /// Distance in meters beyond which a provider's snapped endpoint counts as a bad snap
    #[arg(long, default_value_t = 200, value_parser = clap::value_parser!(u32).range(1..))]
    snap_threshold: u32,

    /// Also write a JSON summary of the run to this path
    #[arg(long, value_name = "PATH")]
    summary_json: Option<String>,

    /// Attempts per request for transient failures
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
    max_attempts: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    let _file_guard = init_logging()?;
    let cli = Cli::parse();

    run(cli).await
}

/// Logging setup: colored stderr + JSON rolling log file.
fn init_logging() -> Result<WorkerGuard> {
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/drive_time_comparison.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("drive_time_comparison.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    Ok(file_guard)
}

#[tracing::instrument(skip_all, fields(input = %cli.input, output = %cli.output))]
async fn run(cli: Cli) -> Result<()> {
    let config = ProvidersConfig::load(&cli.config, |name| std::env::var(name).ok())?;
    if config.providers.is_empty() {
        bail!("no providers are enabled in {}", cli.config);
    }
    let providers = config.ids();
    let mode = Mode::resolve(cli.baseline.as_deref(), &providers)?;
    let outlier_config = cli.outlier_ratio.map(OutlierConfig::with_ratio).transpose()?;
    info!(
        providers = %providers.iter().map(|p| p.name()).collect::<Vec<_>>().join(","),
        "Providers enabled"
    );

    let (dataset, fetch_report) = if cli.skip_data_gathering {
        (read_dataset(&cli.input, &providers)?, None)
    } else {
        let (dataset, report) = collect(&cli, &config).await?;
        (dataset, Some(report))
    };

    let complete = dataset.len() - dataset.incomplete_rows();
    let skipped = dataset.incomplete_rows();
    if complete == 0 {
        warn!("No row has a travel time from every provider");
    } else if skipped > 0 {
        info!(
            skipped,
            percent = %format!("{:.2}", 100.0 * skipped as f64 / dataset.len() as f64),
            "Rows with missing travel times"
        );
    }

    let cases = count_cases(&categorize(&dataset, f64::from(cli.snap_threshold)));
    log_case_summary(&cases);

    let mut analysed = dataset.clone();
    let outliers = match &outlier_config {
        Some(config) => {
            let found = detect_outliers(&analysed, config);
            log_outliers(&found);
            filter_outliers(&mut analysed, &found);
            found
        }
        None => Vec::new(),
    };

    let engine = ComparisonEngine::new(mode);
    let comparison = engine.compare(&analysed);
    log_report(&comparison);
    if !cli.skip_plotting {
        log_charts(&comparison);
    }

    write_dataset(&cli.output, &dataset, &mode.error_columns(&providers))?;
    info!(output = %cli.output, "Detailed results written");

    let summary = RunSummary {
        generated_at: Utc::now(),
        dataset: &cli.output,
        comparison: &comparison,
        fetch: fetch_report.as_ref(),
        outliers: &outliers,
        cases: &cases,
    };
    print_json(&summary)?;
    if let Some(path) = &cli.summary_json {
        write_summary(path, &summary)?;
    }

    Ok(())
}

/// Validates every input, then runs the fetch.
#[tracing::instrument(skip_all)]
async fn collect(cli: &Cli, config: &ProvidersConfig) -> Result<(Dataset, FetchReport)> {
    let pairs = read_route_pairs(&cli.input)?;

    let times = match (&cli.departure_times, &cli.start_time, &cli.end_time, cli.interval) {
        (Some(list), None, None, None) => DepartureTimes::parse_list(list)?,
        (None, Some(start), Some(end), Some(interval)) => {
            DepartureTimes::window(start, end, interval)?
        }
        _ => bail!("provide either --departure-times or --start-time, --end-time and --interval"),
    };
    let (Some(date), Some(time_zone)) = (&cli.date, &cli.time_zone_id) else {
        bail!("--date and --time-zone-id are required when gathering data");
    };
    let departures = DepartureSpec::new(date, time_zone, times)?.instants()?;

    let base: SharedClient = Arc::new(BasicClient::with_timeout(REQUEST_TIMEOUT)?);
    let lanes = config
        .providers
        .iter()
        .map(|p| ProviderLane::from_config(p, base.clone()))
        .collect::<Result<Vec<_>, _>>()?;

    let retry = RetryPolicy {
        max_attempts: cli.max_attempts,
        ..RetryPolicy::default()
    };
    let orchestrator = FetchOrchestrator::new(lanes, retry);
    let (dataset, report) = orchestrator.run(&pairs, &departures).await;

    report.log_summary();
    if report.total_failed() > 0 {
        warn!(failed = report.total_failed(), "Some requests failed, their cells are left empty");
    }
    Ok((dataset, report))
}
