use chrono::{DateTime, FixedOffset};
use reqwest::{Request, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;

use super::{classify_status, decode, endpoint_path, post_json, whole_seconds};
use crate::error::FetchError;
use crate::input::Coordinates;

/// Valhalla error codes meaning no path exists between the points.
const NO_ROUTE_CODES: [u32; 3] = [171, 442, 443];

/// Valhalla `route` action with `auto` costing.
#[derive(Debug, Clone)]
pub struct Valhalla {
    endpoint: Url,
}

#[derive(Deserialize)]
struct RouteResponse {
    trip: Trip,
}

#[derive(Deserialize)]
struct Trip {
    summary: Summary,
}

#[derive(Deserialize)]
struct Summary {
    time: f64,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error_code: u32,
    #[serde(default)]
    error: String,
}

impl Valhalla {
    pub const DEFAULT_ENDPOINT: &str = "https://valhalla1.openstreetmap.de";

    pub fn new(endpoint: Url) -> Self {
        Self { endpoint }
    }

    pub fn request(
        &self,
        origin: Coordinates,
        destination: Coordinates,
        departure: DateTime<FixedOffset>,
    ) -> Result<Request, FetchError> {
        let location = |c: Coordinates| json!({ "lat": c.lat, "lon": c.lng, "type": "break" });
        // type 1 is "depart at", interpreted as local time at the origin
        let body = json!({
            "locations": [location(origin), location(destination)],
            "costing": "auto",
            "date_time": {
                "type": 1,
                "value": departure.format("%Y-%m-%dT%H:%M").to_string(),
            },
            "directions_type": "none",
        });
        post_json(endpoint_path(&self.endpoint, "/route")?, &body)
    }
}

pub(super) fn parse(status: StatusCode, body: &[u8]) -> Result<u32, FetchError> {
    if !status.is_success() {
        if let Ok(err) = decode::<ErrorResponse>(body) {
            if NO_ROUTE_CODES.contains(&err.error_code) {
                return Err(FetchError::no_route(err.error));
            }
        }
        return Err(classify_status(status, body));
    }

    let response: RouteResponse = decode(body)?;
    whole_seconds(response.trip.summary.time)
}
