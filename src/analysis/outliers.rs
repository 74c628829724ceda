//! Row-level outlier detection.
//!
//! A row is flagged when one provider's value is at least `ratio` times
//! larger or smaller than the median of the row's positive values. Such rows
//! usually mean a routing failure on one side (a snapped-to-wrong-road
//! origin, a ferry detour) rather than a genuine disagreement.

use serde::Serialize;
use tracing::info;

use super::utility::median;
use crate::config::ProviderId;
use crate::dataset::{Dataset, DatasetKey};
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierConfig {
    /// Flag values whose ratio to the median is at least this.
    pub ratio_threshold: f64,
    /// Rows with fewer positive values than this are never flagged.
    pub min_providers: usize,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            ratio_threshold: 3.0,
            min_providers: 2,
        }
    }
}

impl OutlierConfig {
    /// Default settings with a custom ratio. Every ratio to the median is at
    /// least 1, so a threshold of 1 or less would flag every row.
    pub fn with_ratio(ratio_threshold: f64) -> Result<Self, ConfigError> {
        if !ratio_threshold.is_finite() || ratio_threshold <= 1.0 {
            return Err(ConfigError::InvalidOutlierRatio(ratio_threshold));
        }
        Ok(Self {
            ratio_threshold,
            ..Self::default()
        })
    }
}

/// The first offending value found in a flagged row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outlier {
    /// 1-based position in the dataset, not counting the header.
    pub row: usize,
    #[serde(skip)]
    pub key: DatasetKey,
    pub provider: ProviderId,
    pub value: u32,
    pub median: f64,
    pub ratio: f64,
}

pub fn detect_outliers(dataset: &Dataset, config: &OutlierConfig) -> Vec<Outlier> {
    let mut outliers = Vec::new();

    for (index, row) in dataset.rows().iter().enumerate() {
        let values: Vec<(ProviderId, u32)> = dataset
            .providers()
            .iter()
            .filter_map(|&p| row.get(p).map(|v| (p, v)))
            .filter(|&(_, v)| v > 0)
            .collect();
        if values.len() < config.min_providers {
            continue;
        }

        let positives: Vec<f64> = values.iter().map(|&(_, v)| f64::from(v)).collect();
        let Some(median) = median(&positives) else {
            continue;
        };

        for &(provider, value) in &values {
            let value_f = f64::from(value);
            let ratio = if value_f > median {
                value_f / median
            } else {
                median / value_f
            };
            if ratio >= config.ratio_threshold {
                outliers.push(Outlier {
                    row: index + 1,
                    key: row.key,
                    provider,
                    value,
                    median,
                    ratio,
                });
                // one report per row
                break;
            }
        }
    }

    outliers
}

/// Drops the flagged rows from `dataset`.
pub fn filter_outliers(dataset: &mut Dataset, outliers: &[Outlier]) {
    if outliers.is_empty() {
        return;
    }
    dataset.retain(|row| !outliers.iter().any(|o| o.key == row.key));
}

pub fn log_outliers(outliers: &[Outlier]) {
    if outliers.is_empty() {
        info!("No outliers detected");
        return;
    }
    info!(count = outliers.len(), "Outlier rows detected");
    for outlier in outliers {
        info!(
            row = outlier.row,
            provider = outlier.provider.display_name(),
            value = outlier.value,
            median = %format!("{:.0}", outlier.median),
            ratio = %format!("{:.1}x", outlier.ratio),
            "Outlier"
        );
    }
}
