use chrono::{DateTime, FixedOffset, SecondsFormat};
use reqwest::{Request, StatusCode, Url};
use serde::Deserialize;

use super::{classify_status, decode, endpoint_path, get, whole_seconds};
use crate::error::FetchError;
use crate::input::Coordinates;

/// TomTom Routing API `calculateRoute`.
#[derive(Debug, Clone)]
pub struct TomTom {
    endpoint: Url,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalculateRouteResponse {
    #[serde(default)]
    routes: Vec<Route>,
}

#[derive(Deserialize)]
struct Route {
    summary: Summary,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Summary {
    travel_time_in_seconds: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    detailed_error: Option<DetailedError>,
}

#[derive(Deserialize)]
struct DetailedError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl TomTom {
    pub const DEFAULT_ENDPOINT: &str = "https://api.tomtom.com";

    pub fn new(endpoint: Url) -> Self {
        Self { endpoint }
    }

    pub fn request(
        &self,
        origin: Coordinates,
        destination: Coordinates,
        departure: DateTime<FixedOffset>,
    ) -> Result<Request, FetchError> {
        let locations = format!(
            "{},{}:{},{}",
            origin.lat, origin.lng, destination.lat, destination.lng
        );
        let mut url = endpoint_path(
            &self.endpoint,
            &format!("/routing/1/calculateRoute/{locations}/json"),
        )?;
        url.query_pairs_mut()
            .append_pair(
                "departAt",
                &departure.to_rfc3339_opts(SecondsFormat::Secs, true),
            )
            .append_pair("travelMode", "car");
        Ok(get(url))
    }
}

pub(super) fn parse(status: StatusCode, body: &[u8]) -> Result<u32, FetchError> {
    if !status.is_success() {
        if let Ok(ErrorResponse {
            detailed_error: Some(detail),
        }) = decode::<ErrorResponse>(body)
        {
            if detail.code == "NO_ROUTE_FOUND" {
                return Err(FetchError::no_route(detail.message));
            }
        }
        return Err(classify_status(status, body));
    }

    let response: CalculateRouteResponse = decode(body)?;
    let route = response
        .routes
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::no_route("no routes returned"))?;
    whole_seconds(route.summary.travel_time_in_seconds)
}
