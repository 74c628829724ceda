use reqwest::{Request, StatusCode, Url};
use serde::Deserialize;

use super::{classify_status, decode, endpoint_path, get, whole_seconds};
use crate::error::FetchError;
use crate::input::Coordinates;

/// OSRM `route` service, driving profile.
///
/// OSRM has no notion of departure time; every departure of a pair gets the
/// same free-flow estimate.
#[derive(Debug, Clone)]
pub struct Osrm {
    endpoint: Url,
}

#[derive(Debug, Deserialize)]
struct RouteResponse {
    code: String,
    message: Option<String>,
    #[serde(default)]
    routes: Vec<Route>,
}

impl RouteResponse {
    fn is_ok(&self) -> bool {
        self.code.eq_ignore_ascii_case("ok")
    }

    fn is_no_route(&self) -> bool {
        matches!(self.code.as_str(), "NoRoute" | "NoSegment")
    }

    fn message(&self) -> String {
        self.message.clone().unwrap_or_else(|| self.code.clone())
    }
}

#[derive(Debug, Deserialize)]
struct Route {
    #[serde(default)]
    legs: Vec<Leg>,
    duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Leg {
    duration: f64,
}

impl Osrm {
    pub const DEFAULT_ENDPOINT: &str = "http://router.project-osrm.org";

    pub fn new(endpoint: Url) -> Self {
        Self { endpoint }
    }

    pub fn request(
        &self,
        origin: Coordinates,
        destination: Coordinates,
    ) -> Result<Request, FetchError> {
        let path = format!(
            "/route/v1/driving/{},{};{},{}",
            origin.lng, origin.lat, destination.lng, destination.lat
        );
        let mut url = endpoint_path(&self.endpoint, &path)?;
        url.query_pairs_mut().append_pair("overview", "false");
        Ok(get(url))
    }
}

pub(super) fn parse(status: StatusCode, body: &[u8]) -> Result<u32, FetchError> {
    let decoded = decode::<RouteResponse>(body);
    if let Ok(response) = &decoded {
        if response.is_no_route() {
            return Err(FetchError::no_route(response.message()));
        }
    }
    if !status.is_success() {
        return Err(classify_status(status, body));
    }

    let response = decoded?;
    if !response.is_ok() {
        return Err(FetchError::malformed(format!(
            "OSRM returned code {}",
            response.message()
        )));
    }
    let route = response
        .routes
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::no_route("no routes returned"))?;
    let seconds = if route.legs.is_empty() {
        route
            .duration
            .ok_or_else(|| FetchError::malformed("route has no legs or duration"))?
    } else {
        route.legs.iter().map(|leg| leg.duration).sum()
    };
    whole_seconds(seconds)
}
