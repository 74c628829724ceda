use chrono::{DateTime, FixedOffset, SecondsFormat};
use reqwest::{Request, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;

use super::{
    RouteResult, classify_status, decode, endpoint_path, post_json, rounded, snapped_point,
    whole_seconds,
};
use crate::dataset::RouteDetails;
use crate::error::FetchError;
use crate::input::Coordinates;

/// TravelTime `/v4/routes`, one driving departure search per request.
#[derive(Debug, Clone)]
pub struct TravelTime {
    endpoint: Url,
}

#[derive(Deserialize)]
struct RoutesResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Deserialize)]
struct SearchResult {
    #[serde(default)]
    locations: Vec<Location>,
    #[serde(default)]
    unreachable: Vec<String>,
}

#[derive(Deserialize)]
struct Location {
    #[serde(default)]
    properties: Vec<Properties>,
}

#[derive(Deserialize)]
struct Properties {
    travel_time: Option<f64>,
    route: Option<RouteProperty>,
}

#[derive(Deserialize)]
struct RouteProperty {
    #[serde(default)]
    parts: Vec<RoutePart>,
}

#[derive(Deserialize)]
struct RoutePart {
    #[serde(default)]
    distance: f64,
    #[serde(default)]
    coords: Vec<PartCoords>,
}

#[derive(Deserialize)]
struct PartCoords {
    lat: f64,
    lng: f64,
}

impl RouteProperty {
    /// Total distance and the first and last point the route actually uses.
    fn details(&self) -> RouteDetails {
        let mut points = self.parts.iter().flat_map(|part| part.coords.iter());
        let first = points.next();
        let last = points.last().or(first);
        RouteDetails {
            distance_meters: rounded(self.parts.iter().map(|part| part.distance).sum()),
            snapped_origin: first.and_then(|c| snapped_point(c.lat, c.lng)),
            snapped_destination: last.and_then(|c| snapped_point(c.lat, c.lng)),
            warnings: Vec::new(),
        }
    }
}

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    description: String,
}

impl TravelTime {
    pub const DEFAULT_ENDPOINT: &str = "https://api.traveltimeapp.com";

    pub fn new(endpoint: Url) -> Self {
        Self { endpoint }
    }

    pub fn request(
        &self,
        origin: Coordinates,
        destination: Coordinates,
        departure: DateTime<FixedOffset>,
    ) -> Result<Request, FetchError> {
        let body = json!({
            "locations": [
                { "id": "origin", "coords": { "lat": origin.lat, "lng": origin.lng } },
                { "id": "destination", "coords": { "lat": destination.lat, "lng": destination.lng } },
            ],
            "departure_searches": [{
                "id": "comparison",
                "departure_location_id": "origin",
                "arrival_location_ids": ["destination"],
                "departure_time": departure.to_rfc3339_opts(SecondsFormat::Secs, true),
                "properties": ["travel_time", "route"],
                "transportation": { "type": "driving" },
                "snapping": {
                    "penalty": "disabled",
                    "accept_roads": "both_drivable_and_walkable",
                },
            }],
            "arrival_searches": [],
        });
        post_json(endpoint_path(&self.endpoint, "/v4/routes")?, &body)
    }
}

pub(super) fn parse(status: StatusCode, body: &[u8]) -> Result<RouteResult, FetchError> {
    if !status.is_success() {
        return Err(match decode::<ErrorResponse>(body) {
            Ok(err) if !err.description.is_empty() && status.is_client_error() => {
                let mut mapped = classify_status(status, body);
                if let FetchError::InvalidRequest { message, .. } = &mut mapped {
                    *message = err.description;
                }
                mapped
            }
            _ => classify_status(status, body),
        });
    }

    let response: RoutesResponse = decode(body)?;
    let Some(result) = response.results.into_iter().next() else {
        return Err(FetchError::malformed("response has no results"));
    };
    let Some(location) = result.locations.into_iter().next() else {
        return Err(if result.unreachable.is_empty() {
            FetchError::no_route("no locations returned")
        } else {
            FetchError::no_route(format!("unreachable: {}", result.unreachable.join(", ")))
        });
    };
    let properties = location.properties.into_iter().next();
    let travel_time = properties
        .as_ref()
        .and_then(|p| p.travel_time)
        .ok_or_else(|| FetchError::malformed("location has no travel_time property"))?;
    Ok(RouteResult {
        seconds: whole_seconds(travel_time)?,
        details: properties
            .and_then(|p| p.route)
            .map(|route| route.details())
            .unwrap_or_default(),
    })
}
