use reqwest::{Request, StatusCode, Url};
use serde::Deserialize;

use super::{classify_status, decode, endpoint_path, get, whole_seconds};
use crate::error::FetchError;
use crate::input::Coordinates;

/// openrouteservice error codes meaning no route exists between the points.
const NO_ROUTE_CODES: [u32; 2] = [2009, 2010];

/// openrouteservice directions, `driving-car` profile.
///
/// The service has no departure time parameter, so results are
/// traffic-independent.
#[derive(Debug, Clone)]
pub struct OpenRoutes {
    endpoint: Url,
}

#[derive(Deserialize)]
struct DirectionsResponse {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    properties: Properties,
}

#[derive(Deserialize)]
struct Properties {
    #[serde(default)]
    segments: Vec<Segment>,
    summary: Option<Segment>,
}

#[derive(Deserialize)]
struct Segment {
    #[serde(default)]
    duration: f64,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: u32,
    #[serde(default)]
    message: String,
}

impl OpenRoutes {
    pub const DEFAULT_ENDPOINT: &str = "https://api.openrouteservice.org";

    pub fn new(endpoint: Url) -> Self {
        Self { endpoint }
    }

    pub fn request(
        &self,
        origin: Coordinates,
        destination: Coordinates,
    ) -> Result<Request, FetchError> {
        let mut url = endpoint_path(&self.endpoint, "/v2/directions/driving-car")?;
        url.query_pairs_mut()
            .append_pair("start", &format!("{},{}", origin.lng, origin.lat))
            .append_pair("end", &format!("{},{}", destination.lng, destination.lat));
        Ok(get(url))
    }
}

pub(super) fn parse(status: StatusCode, body: &[u8]) -> Result<u32, FetchError> {
    if !status.is_success() {
        if let Ok(err) = decode::<ErrorResponse>(body) {
            if NO_ROUTE_CODES.contains(&err.error.code) {
                return Err(FetchError::no_route(err.error.message));
            }
        }
        return Err(classify_status(status, body));
    }

    let response: DirectionsResponse = decode(body)?;
    let feature = response
        .features
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::no_route("no features returned"))?;
    let properties = feature.properties;
    if !properties.segments.is_empty() {
        return whole_seconds(properties.segments.iter().map(|s| s.duration).sum());
    }
    // a zero-length route has a summary but no segments
    match properties.summary {
        Some(summary) => whole_seconds(summary.duration),
        None => Err(FetchError::malformed("feature has neither segments nor summary")),
    }
}
