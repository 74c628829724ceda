//! Routing provider adapters.
//!
//! Each provider is a variant of the closed [`ProviderAdapter`] enum, built
//! from its [`ProviderConfig`] by [`ProviderAdapter::from_config`]. A variant
//! knows how to turn `(origin, destination, departure)` into its provider's
//! request and how to read a [`RouteResult`] back out of the response. Every
//! failure leaves this module as a [`FetchError`]; provider-specific error
//! payloads never escape.
//!
//! Credentials are not part of the adapter. [`authorize`] wraps the shared
//! HTTP client in the header or query-parameter decorator the provider
//! expects, so adapters only deal with wire shapes.

mod google;
mod here;
mod mapbox;
mod openroutes;
mod osrm;
mod traveltime;
mod valhalla;
mod tomtom;

use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Method, Request, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::{ProviderConfig, ProviderId};
use crate::dataset::RouteDetails;
use crate::error::{ConfigError, FetchError};
use crate::fetch::auth::{ApiKey, UrlParam};
use crate::fetch::{HttpClient, SharedClient};
use crate::input::Coordinates;

pub use google::Google;
pub use here::Here;
pub use mapbox::Mapbox;
pub use openroutes::OpenRoutes;
pub use osrm::Osrm;
pub use tomtom::TomTom;
pub use traveltime::TravelTime;
pub use valhalla::Valhalla;

/// Longest body excerpt carried in error messages.
const EXCERPT_LEN: usize = 300;

/// A successful answer: the travel time plus whatever else the provider
/// reports about the route.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteResult {
    pub seconds: u32,
    pub details: RouteDetails,
}

impl From<u32> for RouteResult {
    fn from(seconds: u32) -> Self {
        Self {
            seconds,
            details: RouteDetails::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ProviderAdapter {
    TravelTime(TravelTime),
    Google(Google),
    TomTom(TomTom),
    Here(Here),
    Mapbox(Mapbox),
    OpenRoutes(OpenRoutes),
    Osrm(Osrm),
    Valhalla(Valhalla),
}

impl ProviderAdapter {
    /// Selects the variant for `config.id`, resolving its endpoint.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ConfigError> {
        let endpoint = |default: &str| endpoint_url(config, default);
        Ok(match config.id {
            ProviderId::TravelTime => {
                Self::TravelTime(TravelTime::new(endpoint(TravelTime::DEFAULT_ENDPOINT)?))
            }
            ProviderId::Google => Self::Google(Google::new(endpoint(Google::DEFAULT_ENDPOINT)?)),
            ProviderId::TomTom => Self::TomTom(TomTom::new(endpoint(TomTom::DEFAULT_ENDPOINT)?)),
            ProviderId::Here => Self::Here(Here::new(endpoint(Here::DEFAULT_ENDPOINT)?)),
            ProviderId::Mapbox => Self::Mapbox(Mapbox::new(endpoint(Mapbox::DEFAULT_ENDPOINT)?)),
            ProviderId::OpenRoutes => {
                Self::OpenRoutes(OpenRoutes::new(endpoint(OpenRoutes::DEFAULT_ENDPOINT)?))
            }
            ProviderId::Osrm => Self::Osrm(Osrm::new(endpoint(Osrm::DEFAULT_ENDPOINT)?)),
            ProviderId::Valhalla => {
                Self::Valhalla(Valhalla::new(endpoint(Valhalla::DEFAULT_ENDPOINT)?))
            }
        })
    }

    pub fn id(&self) -> ProviderId {
        match self {
            Self::TravelTime(_) => ProviderId::TravelTime,
            Self::Google(_) => ProviderId::Google,
            Self::TomTom(_) => ProviderId::TomTom,
            Self::Here(_) => ProviderId::Here,
            Self::Mapbox(_) => ProviderId::Mapbox,
            Self::OpenRoutes(_) => ProviderId::OpenRoutes,
            Self::Osrm(_) => ProviderId::Osrm,
            Self::Valhalla(_) => ProviderId::Valhalla,
        }
    }

    /// Builds the provider request for one route at one departure instant.
    pub fn request(
        &self,
        origin: Coordinates,
        destination: Coordinates,
        departure: DateTime<FixedOffset>,
    ) -> Result<Request, FetchError> {
        match self {
            Self::TravelTime(p) => p.request(origin, destination, departure),
            Self::Google(p) => p.request(origin, destination, departure),
            Self::TomTom(p) => p.request(origin, destination, departure),
            Self::Here(p) => p.request(origin, destination, departure),
            Self::Mapbox(p) => p.request(origin, destination, departure),
            Self::OpenRoutes(p) => p.request(origin, destination),
            Self::Osrm(p) => p.request(origin, destination),
            Self::Valhalla(p) => p.request(origin, destination, departure),
        }
    }

    /// Reads the travel time, in whole seconds, out of a provider response.
    /// TravelTime, Google and Mapbox also report distance and snapped
    /// endpoints; Google adds route warnings.
    pub fn parse(&self, status: StatusCode, body: &[u8]) -> Result<RouteResult, FetchError> {
        match self {
            Self::TravelTime(_) => traveltime::parse(status, body),
            Self::Google(_) => google::parse(status, body),
            Self::TomTom(_) => tomtom::parse(status, body).map(RouteResult::from),
            Self::Here(_) => here::parse(status, body).map(RouteResult::from),
            Self::Mapbox(_) => mapbox::parse(status, body),
            Self::OpenRoutes(_) => openroutes::parse(status, body).map(RouteResult::from),
            Self::Osrm(_) => osrm::parse(status, body).map(RouteResult::from),
            Self::Valhalla(_) => valhalla::parse(status, body).map(RouteResult::from),
        }
    }

    /// Performs one request and returns the route result.
    pub async fn fetch(
        &self,
        client: &dyn HttpClient,
        origin: Coordinates,
        destination: Coordinates,
        departure: DateTime<FixedOffset>,
    ) -> Result<RouteResult, FetchError> {
        let request = self.request(origin, destination, departure)?;
        debug!(provider = %self.id(), url = %request.url().path(), "Sending request");

        let response = client.execute(request).await.map_err(convert_reqwest_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(convert_reqwest_error)?;

        self.parse(status, &body)
    }
}

/// Wraps `base` with the credentials `config.id` expects.
pub fn authorize(config: &ProviderConfig, base: SharedClient) -> Result<SharedClient, ConfigError> {
    let secret = |value: &Option<String>, field: &'static str| {
        value.clone().ok_or_else(|| ConfigError::MissingCredential {
            provider: config.id.name().to_string(),
            field,
        })
    };
    let api_key = || secret(&config.credentials.api_key, "api-key");
    let url_param = |param_name: &str, key: String| -> SharedClient {
        Arc::new(UrlParam::new(base.clone(), param_name, key))
    };

    let client: SharedClient = match config.id {
        ProviderId::TravelTime => {
            let app_id = secret(&config.credentials.app_id, "app-id")?;
            let with_app = ApiKey::new(base.clone(), "X-Application-Id", &app_id)?;
            Arc::new(ApiKey::new(with_app, "X-Api-Key", &api_key()?)?)
        }
        ProviderId::Google => Arc::new(ApiKey::new(base.clone(), "X-Goog-Api-Key", &api_key()?)?),
        ProviderId::TomTom => url_param("key", api_key()?),
        ProviderId::Here => url_param("apikey", api_key()?),
        ProviderId::Mapbox => url_param("access_token", api_key()?),
        ProviderId::OpenRoutes => url_param("api_key", api_key()?),
        ProviderId::Osrm | ProviderId::Valhalla => base,
    };
    Ok(client)
}

fn endpoint_url(config: &ProviderConfig, default: &str) -> Result<Url, ConfigError> {
    let raw = config.api_endpoint.as_deref().unwrap_or(default);
    // overrides are often written as a bare host
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    let url = Url::parse(&with_scheme).map_err(|e| ConfigError::InvalidEndpoint {
        provider: config.id.name().to_string(),
        endpoint: raw.to_string(),
        message: e.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidEndpoint {
            provider: config.id.name().to_string(),
            endpoint: raw.to_string(),
            message: "not a base URL".to_string(),
        });
    }
    Ok(url)
}

/// Appends `path` to the endpoint, keeping any path prefix it already has.
pub(crate) fn endpoint_path(endpoint: &Url, path: &str) -> Result<Url, FetchError> {
    let base = endpoint.as_str().trim_end_matches('/');
    Url::parse(&format!("{base}{path}")).map_err(|e| FetchError::InvalidRequest {
        status: 0,
        message: format!("cannot build URL from {base}{path}: {e}"),
    })
}

pub(crate) fn get(url: Url) -> Request {
    Request::new(Method::GET, url)
}

pub(crate) fn post_json(url: Url, body: &serde_json::Value) -> Result<Request, FetchError> {
    let bytes = serde_json::to_vec(body).map_err(|e| FetchError::InvalidRequest {
        status: 0,
        message: format!("cannot encode request body: {e}"),
    })?;
    let mut request = Request::new(Method::POST, url);
    request
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    *request.body_mut() = Some(bytes.into());
    Ok(request)
}

pub(crate) fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, FetchError> {
    serde_json::from_slice(body)
        .map_err(|e| FetchError::malformed(format!("{e}; body: {}", excerpt(body))))
}

/// Maps a non-success status that carried no provider-specific meaning.
pub(crate) fn classify_status(status: StatusCode, body: &[u8]) -> FetchError {
    let message = format!("{status}: {}", excerpt(body));
    match status.as_u16() {
        401 | 403 => FetchError::Authentication { message },
        429 => FetchError::RateLimitExceeded { message },
        500..=599 => FetchError::TransientNetwork { message },
        code => FetchError::InvalidRequest {
            status: code,
            message,
        },
    }
}

/// Rounds a provider duration to whole seconds, rejecting nonsense values.
pub(crate) fn whole_seconds(value: f64) -> Result<u32, FetchError> {
    rounded(value).ok_or_else(|| {
        FetchError::malformed(format!("travel time {value} is not a valid duration"))
    })
}

/// Rounds a non-negative quantity that fits in `u32`.
pub(crate) fn rounded(value: f64) -> Option<u32> {
    if !value.is_finite() || value < 0.0 || value > f64::from(u32::MAX) {
        return None;
    }
    // bounds checked above
    Some(value.round() as u32)
}

/// A provider-reported point, dropped if it is not a valid coordinate.
pub(crate) fn snapped_point(lat: f64, lng: f64) -> Option<Coordinates> {
    Coordinates::new(lat, lng).ok()
}

pub(crate) fn excerpt(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    match trimmed.char_indices().nth(EXCERPT_LEN) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

fn convert_reqwest_error(error: reqwest::Error) -> FetchError {
    if let Some(status) = error.status() {
        return classify_status(status, error.to_string().as_bytes());
    }
    if error.is_decode() {
        return FetchError::malformed(error.to_string());
    }
    if error.is_builder() {
        return FetchError::InvalidRequest {
            status: 0,
            message: error.to_string(),
        };
    }
    // connect, timeout, body and redirect failures
    FetchError::transient(error.to_string())
}
