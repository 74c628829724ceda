//! In-memory result table keyed by route pair and departure instant.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, FixedOffset};

use crate::config::ProviderId;
use crate::departure::DEPARTURE_FORMAT;
use crate::input::{Coordinates, RoutePair};

/// Identity of one dataset row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DatasetKey {
    pub pair: RoutePair,
    pub departure: DateTime<FixedOffset>,
}

impl std::fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}", self.pair, self.departure.format(DEPARTURE_FORMAT))
    }
}

/// What a provider reported about a route besides its travel time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteDetails {
    pub distance_meters: Option<u32>,
    /// Where the provider placed the origin on its road network.
    pub snapped_origin: Option<Coordinates>,
    pub snapped_destination: Option<Coordinates>,
    pub warnings: Vec<String>,
}

impl RouteDetails {
    pub fn is_empty(&self) -> bool {
        self.distance_meters.is_none()
            && self.snapped_origin.is_none()
            && self.snapped_destination.is_none()
            && self.warnings.is_empty()
    }
}

/// One `(pair, departure)` row. A provider absent from `travel_times` failed
/// or was never asked; there is no zero placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub key: DatasetKey,
    pub travel_times: BTreeMap<ProviderId, u32>,
    /// Only providers that reported something beyond the travel time.
    pub details: BTreeMap<ProviderId, RouteDetails>,
}

impl Row {
    pub fn get(&self, provider: ProviderId) -> Option<u32> {
        self.travel_times.get(&provider).copied()
    }

    pub fn details(&self, provider: ProviderId) -> Option<&RouteDetails> {
        self.details.get(&provider)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    providers: Vec<ProviderId>,
    rows: Vec<Row>,
    index: HashMap<DatasetKey, usize>,
}

impl Dataset {
    /// An empty table whose columns are `providers`, in that order.
    pub fn new(providers: Vec<ProviderId>) -> Self {
        Self {
            providers,
            rows: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// A table with one empty row per `(pair, departure)`, pair-major.
    pub fn with_rows(
        providers: Vec<ProviderId>,
        pairs: &[RoutePair],
        departures: &[DateTime<FixedOffset>],
    ) -> Self {
        let mut dataset = Self::new(providers);
        for &pair in pairs {
            for &departure in departures {
                dataset.ensure_row(DatasetKey { pair, departure });
            }
        }
        dataset
    }

    /// Returns the row for `key`, appending an empty one if it is new.
    pub fn ensure_row(&mut self, key: DatasetKey) -> &mut Row {
        let position = match self.index.get(&key) {
            Some(&position) => position,
            None => {
                self.rows.push(Row {
                    key,
                    travel_times: BTreeMap::new(),
                    details: BTreeMap::new(),
                });
                self.index.insert(key, self.rows.len() - 1);
                self.rows.len() - 1
            }
        };
        &mut self.rows[position]
    }

    /// Stores one provider's result; each `(key, provider)` cell is written
    /// at most once per run, so a later write simply replaces.
    pub fn insert(&mut self, key: DatasetKey, provider: ProviderId, seconds: u32) {
        self.ensure_row(key).travel_times.insert(provider, seconds);
    }

    /// Attaches route details to a cell. Empty details are not stored.
    pub fn insert_details(&mut self, key: DatasetKey, provider: ProviderId, details: RouteDetails) {
        if details.is_empty() {
            return;
        }
        self.ensure_row(key).details.insert(provider, details);
    }

    pub fn providers(&self) -> &[ProviderId] {
        &self.providers
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows missing at least one provider's value.
    pub fn incomplete_rows(&self) -> usize {
        self.rows
            .iter()
            .filter(|row| self.providers.iter().any(|&p| row.get(p).is_none()))
            .count()
    }

    /// Keeps only rows matching `keep`, preserving order.
    pub fn retain(&mut self, keep: impl FnMut(&Row) -> bool) {
        self.rows.retain(keep);
        self.index = self
            .rows
            .iter()
            .enumerate()
            .map(|(position, row)| (row.key, position))
            .collect();
    }
}
