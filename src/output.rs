//! Output formatting and persistence for comparison runs.
//!
//! Writes the dataset CSV (travel times, route details and per-row error
//! percentages), reads it back for analysis-only runs, and serializes the
//! JSON summary.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, FixedOffset, Utc};
use csv::{StringRecord, WriterBuilder};
use serde::Serialize;
use tracing::{debug, info};

use crate::analysis::outliers::Outlier;
use crate::analysis::snapping::CaseCategory;
use crate::analysis::{ComparisonReport, error_column_name, row_error};
use crate::config::ProviderId;
use crate::dataset::{Dataset, DatasetKey, RouteDetails};
use crate::departure::DEPARTURE_FORMAT;
use crate::error::ConfigError;
use crate::input::{Coordinates, RoutePair};
use crate::orchestrator::FetchReport;

/// Column name older runs used for TravelTime results.
const LEGACY_TRAVELTIME_COLUMN: &str = "tt_travel_time";

const WARNING_SEPARATOR: &str = " | ";

/// Optional per-provider columns carrying [`RouteDetails`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Detail {
    Distance,
    SnappedOrigin,
    SnappedDestination,
    Warnings,
}

impl Detail {
    const ALL: [Detail; 4] = [
        Detail::Distance,
        Detail::SnappedOrigin,
        Detail::SnappedDestination,
        Detail::Warnings,
    ];

    fn column(self, provider: ProviderId) -> String {
        let suffix = match self {
            Detail::Distance => "distance",
            Detail::SnappedOrigin => "snapped_origin",
            Detail::SnappedDestination => "snapped_destination",
            Detail::Warnings => "warnings",
        };
        format!("{}_{suffix}", provider.name())
    }

    fn cell(self, details: &RouteDetails) -> Option<String> {
        match self {
            Detail::Distance => details.distance_meters.map(|d| d.to_string()),
            Detail::SnappedOrigin => details.snapped_origin.map(|c| c.to_string()),
            Detail::SnappedDestination => details.snapped_destination.map(|c| c.to_string()),
            Detail::Warnings if details.warnings.is_empty() => None,
            Detail::Warnings => Some(details.warnings.join(WARNING_SEPARATOR)),
        }
    }

    /// Stores a non-empty cell into `details`. `None` if the cell is invalid.
    fn apply(self, details: &mut RouteDetails, value: &str) -> Option<()> {
        match self {
            Detail::Distance => details.distance_meters = Some(parse_rounded(value)?),
            Detail::SnappedOrigin => details.snapped_origin = Some(Coordinates::parse(value).ok()?),
            Detail::SnappedDestination => {
                details.snapped_destination = Some(Coordinates::parse(value).ok()?)
            }
            Detail::Warnings => {
                details.warnings = value
                    .split(WARNING_SEPARATOR.trim())
                    .map(str::trim)
                    .filter(|w| !w.is_empty())
                    .map(str::to_string)
                    .collect()
            }
        }
        Some(())
    }
}

/// Writes one row per `(pair, departure)` with a travel time column per
/// provider and one `error_percentage_a_to_b` column per entry of `errors`.
///
/// Route detail columns (`google_distance`, `google_snapped_origin`, ...) are
/// only written for details some row actually has. Missing values and
/// undefined errors are written as empty cells.
pub fn write_dataset(
    path: &str,
    dataset: &Dataset,
    errors: &[(ProviderId, ProviderId)],
) -> Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = WriterBuilder::new().from_path(path)?;

    let mut header = vec![
        "origin".to_string(),
        "destination".to_string(),
        "departure_time".to_string(),
    ];
    header.extend(dataset.providers().iter().map(|p| p.travel_time_column()));
    let detail_columns: Vec<(ProviderId, Detail)> = dataset
        .providers()
        .iter()
        .flat_map(|&p| Detail::ALL.into_iter().map(move |d| (p, d)))
        .filter(|&(p, d)| {
            dataset
                .rows()
                .iter()
                .any(|row| row.details(p).and_then(|details| d.cell(details)).is_some())
        })
        .collect();
    header.extend(detail_columns.iter().map(|&(p, d)| d.column(p)));
    header.extend(errors.iter().map(|&(a, b)| error_column_name(a, b)));
    writer.write_record(&header)?;

    for row in dataset.rows() {
        let mut record = vec![
            row.key.pair.origin.to_string(),
            row.key.pair.destination.to_string(),
            row.key.departure.format(DEPARTURE_FORMAT).to_string(),
        ];
        record.extend(
            dataset
                .providers()
                .iter()
                .map(|&p| row.get(p).map(|v| v.to_string()).unwrap_or_default()),
        );
        record.extend(detail_columns.iter().map(|&(p, d)| {
            row.details(p)
                .and_then(|details| d.cell(details))
                .unwrap_or_default()
        }));
        // integer part of the percentage
        record.extend(errors.iter().map(|&(a, b)| {
            row_error(row, a, b)
                .map(|e| (e.trunc() as u64).to_string())
                .unwrap_or_default()
        }));
        writer.write_record(&record)?;
    }
    writer.flush()?;

    info!(path, rows = dataset.len(), "Dataset written");
    Ok(())
}

/// Reads a dataset previously written by [`write_dataset`], keeping only the
/// travel time and route detail columns of `providers`.
pub fn read_dataset(path: &str, providers: &[ProviderId]) -> Result<Dataset, ConfigError> {
    let file = std::fs::File::open(path).map_err(|source| ConfigError::Io {
        path: path.to_string(),
        source,
    })?;
    let dataset = parse_dataset(file, providers)?;
    if dataset.is_empty() {
        return Err(ConfigError::EmptyInput(path.to_string()));
    }
    info!(path, rows = dataset.len(), "Dataset loaded");
    Ok(dataset)
}

pub fn parse_dataset<R: Read>(reader: R, providers: &[ProviderId]) -> Result<Dataset, ConfigError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();

    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| ConfigError::MissingColumn(name.to_string()))
    };
    let origin_col = column("origin")?;
    let destination_col = column("destination")?;
    let departure_col = column("departure_time")?;

    let mut provider_cols = Vec::with_capacity(providers.len());
    for &provider in providers {
        let name = provider.travel_time_column();
        let index = match column(&name) {
            Err(_) if provider == ProviderId::TravelTime => column(LEGACY_TRAVELTIME_COLUMN)
                .map_err(|_| ConfigError::MissingColumn(name.clone()))?,
            other => other?,
        };
        provider_cols.push((provider, name, index));
    }
    let detail_cols: Vec<(ProviderId, Detail, String, usize)> = providers
        .iter()
        .flat_map(|&p| Detail::ALL.into_iter().map(move |d| (p, d)))
        .filter_map(|(p, d)| {
            let name = d.column(p);
            column(&name).ok().map(|index| (p, d, name, index))
        })
        .collect();

    let mut dataset = Dataset::new(providers.to_vec());
    let mut record = StringRecord::new();
    let mut row = 0;
    while rdr.read_record(&mut record)? {
        row += 1;
        let cell = |index: usize| record.get(index).unwrap_or("").trim();

        let key = DatasetKey {
            pair: RoutePair {
                origin: parse_coordinates(row, cell(origin_col))?,
                destination: parse_coordinates(row, cell(destination_col))?,
            },
            departure: parse_departure(row, cell(departure_col))?,
        };
        dataset.ensure_row(key);

        for (provider, name, index) in &provider_cols {
            let value = cell(*index);
            if value.is_empty() {
                continue;
            }
            let seconds = parse_rounded(value).ok_or_else(|| ConfigError::InvalidCell {
                row,
                column: name.clone(),
                value: value.to_string(),
            })?;
            dataset.insert(key, *provider, seconds);
        }

        let mut details: BTreeMap<ProviderId, RouteDetails> = BTreeMap::new();
        for (provider, detail, name, index) in &detail_cols {
            let value = cell(*index);
            if value.is_empty() {
                continue;
            }
            detail
                .apply(details.entry(*provider).or_default(), value)
                .ok_or_else(|| ConfigError::InvalidCell {
                    row,
                    column: name.clone(),
                    value: value.to_string(),
                })?;
        }
        for (provider, details) in details {
            dataset.insert_details(key, provider, details);
        }
    }

    debug!(rows = dataset.len(), "Dataset parsed");
    Ok(dataset)
}

fn parse_coordinates(row: usize, value: &str) -> Result<Coordinates, ConfigError> {
    Coordinates::parse(value).map_err(|message| ConfigError::InvalidCoordinates {
        row,
        value: value.to_string(),
        message,
    })
}

fn parse_departure(row: usize, value: &str) -> Result<DateTime<FixedOffset>, ConfigError> {
    DateTime::parse_from_str(value, DEPARTURE_FORMAT).map_err(|_| ConfigError::InvalidCell {
        row,
        column: "departure_time".to_string(),
        value: value.to_string(),
    })
}

/// Accepts integer or float-formatted seconds and meters.
fn parse_rounded(value: &str) -> Option<u32> {
    crate::providers::rounded(value.parse().ok()?)
}

/// Everything a run produced, in machine-readable form.
#[derive(Debug, Serialize)]
pub struct RunSummary<'a> {
    pub generated_at: DateTime<Utc>,
    pub dataset: &'a str,
    #[serde(flatten)]
    pub comparison: &'a ComparisonReport,
    pub fetch: Option<&'a FetchReport>,
    pub outliers: &'a [Outlier],
    /// Row count per snapping category.
    pub cases: &'a BTreeMap<CaseCategory, usize>,
}

/// Writes the summary as pretty-printed JSON.
pub fn write_summary(path: &str, summary: &RunSummary<'_>) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, json)?;
    info!(path, "Summary written");
    Ok(())
}

/// Logs the summary as pretty-printed JSON.
pub fn print_json(summary: &RunSummary<'_>) -> Result<()> {
    debug!("{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}
