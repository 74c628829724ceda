//! Route pairs and the input CSV they are read from.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::Read;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ConfigError;

/// A validated WGS84 point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    /// Parses `"lat,lng"`, tolerating whitespace around either part.
    pub fn parse(text: &str) -> Result<Self, String> {
        let parts: Vec<&str> = text.split(',').map(str::trim).collect();
        let [lat, lng] = parts.as_slice() else {
            return Err(format!("expected \"lat,lng\", got {} parts", parts.len()));
        };
        let lat: f64 = lat.parse().map_err(|e| format!("latitude: {e}"))?;
        let lng: f64 = lng.parse().map_err(|e| format!("longitude: {e}"))?;
        Self::new(lat, lng)
    }

    pub fn new(lat: f64, lng: f64) -> Result<Self, String> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(format!("latitude {lat} out of range"));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(format!("longitude {lng} out of range"));
        }
        // normalise -0.0 so equal points hash equally
        Ok(Self {
            lat: lat + 0.0,
            lng: lng + 0.0,
        })
    }
}

// Coordinates are always finite, so bitwise identity is a total equivalence.
impl Eq for Coordinates {}

impl Hash for Coordinates {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.lat.to_bits().hash(state);
        self.lng.to_bits().hash(state);
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lng)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoutePair {
    pub origin: Coordinates,
    pub destination: Coordinates,
}

impl fmt::Display for RoutePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.origin, self.destination)
    }
}

#[derive(Deserialize)]
struct InputRow {
    origin: String,
    destination: String,
}

/// Reads route pairs from a CSV file with `origin` and `destination` columns.
pub fn read_route_pairs(path: &str) -> Result<Vec<RoutePair>, ConfigError> {
    let file = std::fs::File::open(path).map_err(|source| ConfigError::Io {
        path: path.to_string(),
        source,
    })?;
    let pairs = parse_route_pairs(file)?;
    if pairs.is_empty() {
        return Err(ConfigError::EmptyInput(path.to_string()));
    }
    info!(path, routes = pairs.len(), "Route pairs loaded");
    Ok(pairs)
}

/// Parses route pairs, dropping repeats while keeping first-seen order.
pub fn parse_route_pairs<R: Read>(reader: R) -> Result<Vec<RoutePair>, ConfigError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut pairs: Vec<RoutePair> = Vec::new();

    for (index, result) in rdr.deserialize().enumerate() {
        let record: InputRow = result?;
        // 1-based, not counting the header
        let row = index + 1;
        let origin = parse_cell(row, &record.origin)?;
        let destination = parse_cell(row, &record.destination)?;
        let pair = RoutePair {
            origin,
            destination,
        };

        if pairs.contains(&pair) {
            debug!(row, %pair, "Duplicate route pair skipped");
            continue;
        }
        pairs.push(pair);
    }

    Ok(pairs)
}

fn parse_cell(row: usize, value: &str) -> Result<Coordinates, ConfigError> {
    Coordinates::parse(value).map_err(|message| ConfigError::InvalidCoordinates {
        row,
        value: value.to_string(),
        message,
    })
}
