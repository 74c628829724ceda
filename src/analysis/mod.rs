//! Pairwise comparison of provider travel times.
//!
//! [`ComparisonEngine::compare`] turns a finished [`Dataset`] into a
//! [`ComparisonReport`]: a [`ComparisonMatrix`] with statistics for every
//! ordered provider pair that shares at least one row, and one
//! [`ProviderScore`] per scorable provider. Scores are measured either
//! against a fixed baseline or, in cross-validation mode, against the mean of
//! the other providers on the same row.
//!
//! All arithmetic is done on full-precision `f64`; rounding happens only when
//! values are displayed or written out.

pub mod outliers;
pub mod snapping;
pub mod utility;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::ProviderId;
use crate::dataset::{Dataset, Row};
use crate::error::ConfigError;
use utility::{mean, percentile, relative_error, signed_error, stddev};

/// Percentile reported for every provider pair.
pub const REPORTED_PERCENTILE: u32 = 90;

/// Serialized as `{"mode": "baseline", "baseline": "<provider>"}` or
/// `{"mode": "cross_validation"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "baseline", rename_all = "snake_case")]
pub enum Mode {
    /// Every provider is scored against this one.
    Baseline(ProviderId),
    /// Every provider is scored against the mean of the others.
    CrossValidation,
}

impl Mode {
    /// Picks the mode from an optional `--baseline` name, checking that the
    /// baseline is one of the enabled providers.
    pub fn resolve(baseline: Option<&str>, providers: &[ProviderId]) -> Result<Self, ConfigError> {
        let Some(name) = baseline else {
            return Ok(Self::CrossValidation);
        };
        let id: ProviderId = name.parse()?;
        if !providers.contains(&id) {
            return Err(ConfigError::BaselineNotEnabled(id.name().to_string()));
        }
        Ok(Self::Baseline(id))
    }

    pub fn baseline(&self) -> Option<ProviderId> {
        match *self {
            Self::Baseline(base) => Some(base),
            Self::CrossValidation => None,
        }
    }

    /// Ordered `(a, b)` pairs written as `error_percentage_a_to_b` columns.
    pub fn error_columns(&self, providers: &[ProviderId]) -> Vec<(ProviderId, ProviderId)> {
        match *self {
            Self::Baseline(base) => providers
                .iter()
                .filter(|&&p| p != base)
                .map(|&p| (base, p))
                .collect(),
            Self::CrossValidation => providers
                .iter()
                .flat_map(|&a| {
                    providers
                        .iter()
                        .filter(move |&&b| b != a)
                        .map(move |&b| (a, b))
                })
                .collect(),
        }
    }
}

pub fn error_column_name(a: ProviderId, b: ProviderId) -> String {
    format!("error_percentage_{}_to_{}", a.name(), b.name())
}

/// Relative error of `a` against `b` on one row, if both are present and
/// `b` is non-zero.
pub fn row_error(row: &Row, a: ProviderId, b: ProviderId) -> Option<f64> {
    relative_error(f64::from(row.get(a)?), f64::from(row.get(b)?))
}

/// Statistics of `a` measured against `b` over their joint rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairStats {
    /// Mean of `|a - b| / b`, in percent.
    pub mean_abs_error: f64,
    /// Mean of `(a - b) / b`, in percent. Positive when `a` runs longer.
    pub mean_signed_error: f64,
    /// Nearest-rank 90th percentile of the absolute errors.
    pub p90_abs_error: f64,
    pub std_dev: f64,
    pub samples: usize,
}

impl PairStats {
    fn from_errors(signed: &[f64]) -> Option<Self> {
        if signed.is_empty() {
            return None;
        }
        let absolute: Vec<f64> = signed.iter().map(|e| e.abs()).collect();
        let mean_abs_error = mean(&absolute);
        Some(Self {
            mean_abs_error,
            mean_signed_error: mean(signed),
            p90_abs_error: percentile(&absolute, REPORTED_PERCENTILE)?,
            std_dev: stddev(&absolute, mean_abs_error),
            samples: signed.len(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairComparison {
    pub provider: ProviderId,
    pub reference: ProviderId,
    #[serde(flatten)]
    pub stats: PairStats,
}

/// Statistics for every ordered pair with at least one joint row, in
/// provider order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ComparisonMatrix {
    entries: Vec<PairComparison>,
}

impl ComparisonMatrix {
    pub fn build(dataset: &Dataset) -> Self {
        let providers = dataset.providers();
        let mut entries = Vec::new();
        for &a in providers {
            for &b in providers.iter().filter(|&&b| b != a) {
                let errors: Vec<f64> = dataset
                    .rows()
                    .iter()
                    .filter_map(|row| {
                        signed_error(f64::from(row.get(a)?), f64::from(row.get(b)?))
                    })
                    .collect();
                match PairStats::from_errors(&errors) {
                    Some(stats) => entries.push(PairComparison {
                        provider: a,
                        reference: b,
                        stats,
                    }),
                    None => debug!(provider = %a, reference = %b, "No joint rows"),
                }
            }
        }
        Self { entries }
    }

    pub fn get(&self, provider: ProviderId, reference: ProviderId) -> Option<&PairStats> {
        self.entries
            .iter()
            .find(|e| e.provider == provider && e.reference == reference)
            .map(|e| &e.stats)
    }

    pub fn entries(&self) -> &[PairComparison] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderScore {
    pub provider: ProviderId,
    /// `100 - mean absolute error%`.
    pub accuracy: f64,
    /// `100 + mean signed error%`; above 100 means longer travel times than
    /// the reference.
    pub relative_time: f64,
    pub samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonReport {
    #[serde(flatten)]
    pub mode: Mode,
    pub rows: usize,
    /// Sorted by accuracy, best first.
    pub scores: Vec<ProviderScore>,
    pub matrix: ComparisonMatrix,
}

pub struct ComparisonEngine {
    mode: Mode,
}

impl ComparisonEngine {
    pub fn new(mode: Mode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn compare(&self, dataset: &Dataset) -> ComparisonReport {
        let matrix = ComparisonMatrix::build(dataset);
        let mut scores = match self.mode {
            Mode::Baseline(base) => baseline_scores(dataset, &matrix, base),
            Mode::CrossValidation => cross_validation_scores(dataset),
        };
        // stable sort keeps provider order among ties
        scores.sort_by(|a, b| b.accuracy.total_cmp(&a.accuracy));

        ComparisonReport {
            mode: self.mode,
            rows: dataset.len(),
            scores,
            matrix,
        }
    }
}

fn baseline_scores(dataset: &Dataset, matrix: &ComparisonMatrix, base: ProviderId) -> Vec<ProviderScore> {
    let mut scores = Vec::new();
    for &provider in dataset.providers() {
        if provider == base {
            let samples = dataset.rows().iter().filter(|r| r.get(base).is_some()).count();
            scores.push(ProviderScore {
                provider,
                accuracy: 100.0,
                relative_time: 100.0,
                samples,
            });
            continue;
        }
        match matrix.get(provider, base) {
            Some(stats) => scores.push(ProviderScore {
                provider,
                accuracy: 100.0 - stats.mean_abs_error,
                relative_time: 100.0 + stats.mean_signed_error,
                samples: stats.samples,
            }),
            None => warn!(provider = %provider, baseline = %base, "No rows shared with baseline, provider not scored"),
        }
    }
    scores
}

fn cross_validation_scores(dataset: &Dataset) -> Vec<ProviderScore> {
    let providers = dataset.providers();
    if providers.len() < 3 {
        warn!(
            providers = providers.len(),
            "Cross-validation needs at least three providers, no scores computed"
        );
        return Vec::new();
    }

    let mut scores = Vec::new();
    for &provider in providers {
        let errors: Vec<f64> = dataset
            .rows()
            .iter()
            .filter_map(|row| {
                let value = f64::from(row.get(provider)?);
                let others: Vec<f64> = providers
                    .iter()
                    .filter(|&&p| p != provider)
                    .filter_map(|&p| row.get(p).map(f64::from))
                    .collect();
                if others.len() < 2 {
                    return None;
                }
                signed_error(value, mean(&others))
            })
            .collect();

        if errors.is_empty() {
            warn!(provider = %provider, "No rows with two other providers, provider not scored");
            continue;
        }
        let absolute: Vec<f64> = errors.iter().map(|e| e.abs()).collect();
        scores.push(ProviderScore {
            provider,
            accuracy: 100.0 - mean(&absolute),
            relative_time: 100.0 + mean(&errors),
            samples: errors.len(),
        });
    }
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetKey;
    use crate::input::{Coordinates, RoutePair};
    use chrono::DateTime;

    fn dataset(providers: &[ProviderId], rows: &[&[Option<u32>]]) -> Dataset {
        let mut dataset = Dataset::new(providers.to_vec());
        for (i, values) in rows.iter().enumerate() {
            let key = DatasetKey {
                pair: RoutePair {
                    origin: Coordinates::new(10.0 + i as f64, 0.0).unwrap(),
                    destination: Coordinates::new(0.0, 0.0).unwrap(),
                },
                departure: DateTime::parse_from_rfc3339("2024-05-01T08:00:00Z").unwrap(),
            };
            dataset.ensure_row(key);
            for (&provider, value) in providers.iter().zip(values.iter()) {
                if let Some(v) = value {
                    dataset.insert(key, provider, *v);
                }
            }
        }
        dataset
    }

    fn score(report: &ComparisonReport, provider: ProviderId) -> &ProviderScore {
        report
            .scores
            .iter()
            .find(|s| s.provider == provider)
            .unwrap()
    }

    use ProviderId::{Google, Here, Osrm, TomTom, TravelTime};

    #[test]
    fn test_row_error_matches_sample_scenario() {
        let d = dataset(
            &[TravelTime, Google],
            &[&[Some(1970), Some(2224)], &[Some(1868), Some(1832)]],
        );
        let errors: Vec<u64> = d
            .rows()
            .iter()
            .map(|row| row_error(row, TravelTime, Google).unwrap().trunc() as u64)
            .collect();
        assert_eq!(errors, vec![11, 1]);
    }

    #[test]
    fn test_baseline_five_percent_above_and_below() {
        let d = dataset(
            &[TravelTime, Google, TomTom],
            &[
                &[Some(1000), Some(1050), Some(950)],
                &[Some(2000), Some(2100), Some(1900)],
            ],
        );
        let report = ComparisonEngine::new(Mode::Baseline(TravelTime)).compare(&d);

        let above = score(&report, Google);
        assert!((above.accuracy - 95.0).abs() < 1e-9);
        assert!((above.relative_time - 105.0).abs() < 1e-9);

        let below = score(&report, TomTom);
        assert!((below.accuracy - 95.0).abs() < 1e-9);
        assert!((below.relative_time - 95.0).abs() < 1e-9);

        let base = score(&report, TravelTime);
        assert_eq!((base.accuracy, base.relative_time), (100.0, 100.0));
        assert_eq!(report.scores[0].provider, TravelTime);
    }

    #[test]
    fn test_mixed_sign_errors_cancel_in_bias_only() {
        let d = dataset(
            &[TravelTime, Google],
            &[&[Some(100), Some(110)], &[Some(100), Some(90)]],
        );
        let report = ComparisonEngine::new(Mode::Baseline(TravelTime)).compare(&d);
        let google = score(&report, Google);
        assert!((google.accuracy - 90.0).abs() < 1e-9);
        assert!((google.relative_time - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_cross_validation_scores() {
        let d = dataset(
            &[Google, TomTom, Here, Osrm],
            &[
                &[Some(100), Some(110), Some(90), Some(105)],
                &[Some(200), Some(190), Some(210), Some(195)],
                &[Some(300), Some(310), Some(290), Some(305)],
            ],
        );
        let report = ComparisonEngine::new(Mode::CrossValidation).compare(&d);

        let order: Vec<ProviderId> = report.scores.iter().map(|s| s.provider).collect();
        assert_eq!(order, vec![Google, Osrm, TomTom, Here]);
        let accuracy: Vec<f64> = report.scores.iter().map(|s| s.accuracy.round()).collect();
        assert_eq!(accuracy, vec![99.0, 97.0, 93.0, 91.0]);
        let relative: Vec<f64> = report
            .scores
            .iter()
            .map(|s| s.relative_time.round())
            .collect();
        assert_eq!(relative, vec![100.0, 101.0, 103.0, 96.0]);
        assert!(report.scores.iter().all(|s| s.samples == 3));
    }

    #[test]
    fn test_cross_validation_requires_two_others() {
        let d = dataset(
            &[Google, TomTom, Here],
            &[
                &[Some(100), Some(110), None],
                &[Some(200), Some(220), Some(180)],
            ],
        );
        let report = ComparisonEngine::new(Mode::CrossValidation).compare(&d);
        // only the second row qualifies for anyone
        assert!(report.scores.iter().all(|s| s.samples == 1));
        assert!((score(&report, Google).accuracy - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_cross_validation_with_two_providers_has_no_scores() {
        let d = dataset(&[TravelTime, Google], &[&[Some(100), Some(110)]]);
        let report = ComparisonEngine::new(Mode::CrossValidation).compare(&d);
        assert!(report.scores.is_empty());
        assert_eq!(report.matrix.entries().len(), 2);
    }

    #[test]
    fn test_missing_cell_is_excluded_from_its_pairs_only() {
        let d = dataset(
            &[TravelTime, Google, Osrm],
            &[
                &[Some(1970), None, Some(1900)],
                &[Some(1868), Some(1832), Some(1800)],
            ],
        );
        let matrix = ComparisonMatrix::build(&d);
        assert_eq!(matrix.get(TravelTime, Google).unwrap().samples, 1);
        assert_eq!(matrix.get(TravelTime, Osrm).unwrap().samples, 2);
        assert_eq!(matrix.get(Osrm, Google).unwrap().samples, 1);
    }

    #[test]
    fn test_zero_denominator_is_excluded() {
        let d = dataset(
            &[TravelTime, Google],
            &[&[Some(90), Some(0)], &[Some(210), Some(200)], &[Some(290), Some(300)]],
        );
        let stats = ComparisonMatrix::build(&d);
        let stats = stats.get(TravelTime, Google).unwrap();
        assert_eq!(stats.samples, 2);
        assert!((stats.mean_abs_error - (5.0 + 10.0 / 3.0) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_pair_without_joint_rows_is_omitted() {
        let d = dataset(
            &[TravelTime, Google],
            &[&[Some(100), None], &[None, Some(100)]],
        );
        let report = ComparisonEngine::new(Mode::Baseline(TravelTime)).compare(&d);
        assert!(report.matrix.is_empty());
        assert_eq!(report.scores.len(), 1);
    }

    #[test]
    fn test_p90_uses_nearest_rank() {
        let rows: Vec<[Option<u32>; 2]> = (1..=10)
            .map(|i| [Some(100 + i), Some(100)])
            .collect();
        let rows: Vec<&[Option<u32>]> = rows.iter().map(|r| r.as_slice()).collect();
        let d = dataset(&[TravelTime, Google], &rows);
        let matrix = ComparisonMatrix::build(&d);
        assert!((matrix.get(TravelTime, Google).unwrap().p90_abs_error - 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_error_columns_by_mode() {
        let providers = [TravelTime, Google, Osrm];
        let baseline = Mode::Baseline(TravelTime).error_columns(&providers);
        assert_eq!(baseline, vec![(TravelTime, Google), (TravelTime, Osrm)]);

        let cross = Mode::CrossValidation.error_columns(&providers);
        assert_eq!(cross.len(), 6);
        assert_eq!(cross[0], (TravelTime, Google));
        assert_eq!(cross[5], (Osrm, Google));
        assert_eq!(
            error_column_name(TravelTime, Google),
            "error_percentage_traveltime_to_google"
        );
    }

    #[test]
    fn test_resolve_mode() {
        let providers = [TravelTime, Google];
        assert_eq!(Mode::resolve(None, &providers).unwrap(), Mode::CrossValidation);
        assert_eq!(
            Mode::resolve(Some("Google"), &providers).unwrap(),
            Mode::Baseline(Google)
        );
        assert!(matches!(
            Mode::resolve(Some("osrm"), &providers),
            Err(ConfigError::BaselineNotEnabled(_))
        ));
        assert!(matches!(
            Mode::resolve(Some("waze"), &providers),
            Err(ConfigError::UnknownProvider(_))
        ));
    }

    #[test]
    fn test_mode_serialization() {
        assert_eq!(
            serde_json::to_value(Mode::Baseline(TravelTime)).unwrap(),
            serde_json::json!({ "mode": "baseline", "baseline": "traveltime" })
        );
        assert_eq!(
            serde_json::to_value(Mode::CrossValidation).unwrap(),
            serde_json::json!({ "mode": "cross_validation" })
        );
        assert_eq!(Mode::Baseline(Google).baseline(), Some(Google));
        assert_eq!(Mode::CrossValidation.baseline(), None);
    }
}
