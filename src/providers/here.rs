use chrono::{DateTime, FixedOffset, SecondsFormat};
use reqwest::{Request, StatusCode, Url};
use serde::Deserialize;

use super::{classify_status, decode, endpoint_path, get, whole_seconds};
use crate::error::FetchError;
use crate::input::Coordinates;

/// HERE Routing v8.
#[derive(Debug, Clone)]
pub struct Here {
    endpoint: Url,
}

#[derive(Deserialize)]
struct RoutesResponse {
    #[serde(default)]
    routes: Vec<Route>,
    #[serde(default)]
    notices: Vec<Notice>,
}

#[derive(Deserialize)]
struct Route {
    #[serde(default)]
    sections: Vec<Section>,
}

#[derive(Deserialize)]
struct Section {
    summary: Summary,
}

#[derive(Deserialize)]
struct Summary {
    duration: f64,
}

#[derive(Deserialize)]
struct Notice {
    #[serde(default)]
    title: String,
}

impl Here {
    pub const DEFAULT_ENDPOINT: &str = "https://router.hereapi.com";

    pub fn new(endpoint: Url) -> Self {
        Self { endpoint }
    }

    pub fn request(
        &self,
        origin: Coordinates,
        destination: Coordinates,
        departure: DateTime<FixedOffset>,
    ) -> Result<Request, FetchError> {
        let mut url = endpoint_path(&self.endpoint, "/v8/routes")?;
        url.query_pairs_mut()
            .append_pair("transportMode", "car")
            .append_pair("origin", &origin.to_string())
            .append_pair("destination", &destination.to_string())
            .append_pair("return", "summary")
            .append_pair(
                "departureTime",
                &departure.to_rfc3339_opts(SecondsFormat::Secs, true),
            );
        Ok(get(url))
    }
}

pub(super) fn parse(status: StatusCode, body: &[u8]) -> Result<u32, FetchError> {
    if !status.is_success() {
        return Err(classify_status(status, body));
    }

    let response: RoutesResponse = decode(body)?;
    let Some(route) = response.routes.into_iter().next() else {
        let titles: Vec<String> = response.notices.into_iter().map(|n| n.title).collect();
        return Err(FetchError::no_route(if titles.is_empty() {
            "no routes returned".to_string()
        } else {
            titles.join("; ")
        }));
    };
    if route.sections.is_empty() {
        return Err(FetchError::malformed("route has no sections"));
    }
    whole_seconds(route.sections.iter().map(|s| s.summary.duration).sum())
}
