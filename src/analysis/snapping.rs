//! Classification of rows by how providers placed the route endpoints.
//!
//! A provider routes from the nearest point on its road network, not from the
//! requested coordinate. When that point lands far away (the wrong side of a
//! river, a private estate) the travel time describes a different trip. Rows
//! are sorted into a [`CaseCategory`] so such cases can be counted and
//! inspected; they are not removed from the comparison.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info};

use crate::dataset::{Dataset, Row};
use crate::input::Coordinates;

pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Snapped points further than this from the request are bad snaps.
pub const BAD_SNAP_THRESHOLD_METERS: f64 = 200.0;

const RESTRICTED_ROAD_KEYWORDS: [&str; 2] = ["restricted", "private"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseCategory {
    Clean,
    BadSnapOrigin,
    BadSnapDestination,
    BadSnapBoth,
    RestrictedRoad,
}

impl CaseCategory {
    pub const ALL: [CaseCategory; 5] = [
        CaseCategory::Clean,
        CaseCategory::BadSnapOrigin,
        CaseCategory::BadSnapDestination,
        CaseCategory::BadSnapBoth,
        CaseCategory::RestrictedRoad,
    ];

    pub fn is_bad_snap(self) -> bool {
        matches!(
            self,
            CaseCategory::BadSnapOrigin | CaseCategory::BadSnapDestination | CaseCategory::BadSnapBoth
        )
    }
}

/// Great-circle distance in meters.
pub fn haversine_distance(a: Coordinates, b: Coordinates) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Case-insensitive keyword match on provider route warnings.
pub fn has_restricted_road_warning(warnings: &[String]) -> bool {
    warnings.iter().any(|warning| {
        let warning = warning.to_lowercase();
        RESTRICTED_ROAD_KEYWORDS.iter().any(|k| warning.contains(k))
    })
}

/// One bad snap from any provider is enough. A missing snapped point counts
/// as clean. Restricted-road warnings only apply to otherwise clean rows.
pub fn categorize_row(row: &Row, threshold_meters: f64) -> CaseCategory {
    let too_far = |requested: Coordinates, snapped: Option<Coordinates>| {
        snapped.is_some_and(|s| haversine_distance(requested, s) > threshold_meters)
    };

    let mut bad_origin = false;
    let mut bad_destination = false;
    let mut restricted = false;
    for details in row.details.values() {
        bad_origin |= too_far(row.key.pair.origin, details.snapped_origin);
        bad_destination |= too_far(row.key.pair.destination, details.snapped_destination);
        restricted |= has_restricted_road_warning(&details.warnings);
    }

    match (bad_origin, bad_destination) {
        (true, true) => CaseCategory::BadSnapBoth,
        (true, false) => CaseCategory::BadSnapOrigin,
        (false, true) => CaseCategory::BadSnapDestination,
        (false, false) if restricted => CaseCategory::RestrictedRoad,
        (false, false) => CaseCategory::Clean,
    }
}

/// Categories in dataset row order.
pub fn categorize(dataset: &Dataset, threshold_meters: f64) -> Vec<CaseCategory> {
    dataset
        .rows()
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let category = categorize_row(row, threshold_meters);
            if category != CaseCategory::Clean {
                debug!(row = i + 1, key = %row.key, ?category, "Route flagged");
            }
            category
        })
        .collect()
}

/// Counts per category, with every category present.
pub fn count_cases(categories: &[CaseCategory]) -> BTreeMap<CaseCategory, usize> {
    let mut counts: BTreeMap<CaseCategory, usize> =
        CaseCategory::ALL.into_iter().map(|c| (c, 0)).collect();
    for &category in categories {
        *counts.entry(category).or_default() += 1;
    }
    counts
}

pub fn log_case_summary(counts: &BTreeMap<CaseCategory, usize>) {
    let count = |c: CaseCategory| counts.get(&c).copied().unwrap_or(0);
    let bad: usize = counts
        .iter()
        .filter(|(c, _)| c.is_bad_snap())
        .map(|(_, n)| n)
        .sum();
    if bad > 0 {
        info!(
            routes = bad,
            origin = count(CaseCategory::BadSnapOrigin),
            destination = count(CaseCategory::BadSnapDestination),
            both = count(CaseCategory::BadSnapBoth),
            "Detected routes with bad snapping"
        );
    }
    let restricted = count(CaseCategory::RestrictedRoad);
    if restricted > 0 {
        info!(routes = restricted, "Detected routes on restricted or private roads");
    }
    debug!(clean = count(CaseCategory::Clean), "Snapping check done");
}
