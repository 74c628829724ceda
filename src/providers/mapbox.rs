use chrono::{DateTime, FixedOffset, Utc};
use reqwest::{Request, StatusCode, Url};
use serde::Deserialize;

use super::{
    RouteResult, classify_status, decode, endpoint_path, get, rounded, snapped_point,
    whole_seconds,
};
use crate::dataset::RouteDetails;
use crate::error::FetchError;
use crate::input::Coordinates;

/// Mapbox Directions v5 with the `driving-traffic` profile.
#[derive(Debug, Clone)]
pub struct Mapbox {
    endpoint: Url,
}

#[derive(Deserialize)]
struct DirectionsResponse {
    code: Option<String>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    routes: Vec<Route>,
    #[serde(default)]
    waypoints: Vec<Waypoint>,
}

impl DirectionsResponse {
    fn no_route(&self) -> bool {
        matches!(self.code.as_deref(), Some("NoRoute" | "NoSegment"))
    }
}

#[derive(Deserialize)]
struct Route {
    duration: f64,
    distance: Option<f64>,
}

/// A request coordinate as snapped onto the road network.
#[derive(Deserialize)]
struct Waypoint {
    /// `[longitude, latitude]`
    location: Option<[f64; 2]>,
}

impl Waypoint {
    fn point(&self) -> Option<Coordinates> {
        self.location.and_then(|[lng, lat]| snapped_point(lat, lng))
    }
}

impl Mapbox {
    pub const DEFAULT_ENDPOINT: &str = "https://api.mapbox.com";

    pub fn new(endpoint: Url) -> Self {
        Self { endpoint }
    }

    pub fn request(
        &self,
        origin: Coordinates,
        destination: Coordinates,
        departure: DateTime<FixedOffset>,
    ) -> Result<Request, FetchError> {
        let path = format!(
            "/directions/v5/mapbox/driving-traffic/{},{};{},{}",
            origin.lng, origin.lat, destination.lng, destination.lat
        );
        let mut url = endpoint_path(&self.endpoint, &path)?;
        // depart_at only accepts minute precision in UTC
        let depart_at = departure
            .with_timezone(&Utc)
            .format("%Y-%m-%dT%H:%MZ")
            .to_string();
        url.query_pairs_mut()
            .append_pair("depart_at", &depart_at)
            .append_pair("exclude", "ferry");
        Ok(get(url))
    }
}

pub(super) fn parse(status: StatusCode, body: &[u8]) -> Result<RouteResult, FetchError> {
    let decoded = decode::<DirectionsResponse>(body);
    if let Ok(response) = &decoded {
        if response.no_route() {
            return Err(FetchError::no_route(response.message.clone()));
        }
    }
    if !status.is_success() {
        return Err(classify_status(status, body));
    }

    let response = decoded?;
    if response.code.as_deref() != Some("Ok") {
        return Err(FetchError::malformed(format!(
            "unexpected code {:?}: {}",
            response.code, response.message
        )));
    }
    let route = response
        .routes
        .first()
        .ok_or_else(|| FetchError::no_route("no routes returned"))?;
    Ok(RouteResult {
        seconds: whole_seconds(route.duration)?,
        details: RouteDetails {
            distance_meters: route.distance.and_then(rounded),
            snapped_origin: response.waypoints.first().and_then(Waypoint::point),
            snapped_destination: response.waypoints.last().and_then(Waypoint::point),
            warnings: Vec::new(),
        },
    })
}
