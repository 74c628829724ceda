use chrono::{DateTime, FixedOffset, SecondsFormat};
use reqwest::header::HeaderValue;
use reqwest::{Request, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;

use super::{
    RouteResult, classify_status, decode, endpoint_path, excerpt, post_json, snapped_point,
    whole_seconds,
};
use crate::dataset::RouteDetails;
use crate::error::FetchError;
use crate::input::Coordinates;

/// Google Routes API `computeRoutes`, traffic-aware driving.
#[derive(Debug, Clone)]
pub struct Google {
    endpoint: Url,
}

#[derive(Deserialize)]
struct ComputeRoutesResponse {
    #[serde(default)]
    routes: Vec<Route>,
}

/// Response fields requested through `X-Goog-FieldMask`.
const FIELD_MASK: &str = "routes.duration,routes.distanceMeters,routes.warnings,\
                          routes.legs.startLocation,routes.legs.endLocation";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Route {
    duration: Option<String>,
    distance_meters: Option<u32>,
    #[serde(default)]
    warnings: Vec<String>,
    #[serde(default)]
    legs: Vec<Leg>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Leg {
    start_location: Option<Location>,
    end_location: Option<Location>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Location {
    lat_lng: Option<LatLng>,
}

#[derive(Deserialize)]
struct LatLng {
    latitude: f64,
    longitude: f64,
}

impl Location {
    fn point(&self) -> Option<Coordinates> {
        self.lat_lng
            .as_ref()
            .and_then(|p| snapped_point(p.latitude, p.longitude))
    }
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    reason: Option<String>,
}

impl Google {
    pub const DEFAULT_ENDPOINT: &str = "https://routes.googleapis.com";

    pub fn new(endpoint: Url) -> Self {
        Self { endpoint }
    }

    pub fn request(
        &self,
        origin: Coordinates,
        destination: Coordinates,
        departure: DateTime<FixedOffset>,
    ) -> Result<Request, FetchError> {
        let waypoint = |c: Coordinates| {
            json!({ "location": { "latLng": { "latitude": c.lat, "longitude": c.lng } } })
        };
        let body = json!({
            "origin": waypoint(origin),
            "destination": waypoint(destination),
            "travelMode": "DRIVE",
            "routingPreference": "TRAFFIC_AWARE_OPTIMAL",
            "trafficModel": "BEST_GUESS",
            "departureTime": departure.to_rfc3339_opts(SecondsFormat::Secs, true),
            "computeAlternativeRoutes": false,
        });
        let mut request = post_json(
            endpoint_path(&self.endpoint, "/directions/v2:computeRoutes")?,
            &body,
        )?;
        request
            .headers_mut()
            .insert("X-Goog-FieldMask", HeaderValue::from_static(FIELD_MASK));
        Ok(request)
    }
}

pub(super) fn parse(status: StatusCode, body: &[u8]) -> Result<RouteResult, FetchError> {
    if !status.is_success() {
        // an invalid key comes back as 400 INVALID_ARGUMENT
        if let Ok(err) = decode::<ErrorResponse>(body) {
            let key_invalid = err
                .error
                .details
                .iter()
                .any(|d| d.reason.as_deref() == Some("API_KEY_INVALID"));
            if key_invalid {
                return Err(FetchError::Authentication {
                    message: err.error.message,
                });
            }
        }
        return Err(classify_status(status, body));
    }

    let response: ComputeRoutesResponse = decode(body)?;
    let Some(route) = response.routes.into_iter().next() else {
        return Err(FetchError::no_route("no routes returned"));
    };
    let duration = route
        .duration
        .ok_or_else(|| FetchError::malformed("route has no duration"))?;
    let seconds = duration
        .strip_suffix('s')
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| {
            FetchError::malformed(format!("unexpected duration {:?} in {}", duration, excerpt(body)))
        })?;

    let details = RouteDetails {
        distance_meters: route.distance_meters,
        snapped_origin: route
            .legs
            .first()
            .and_then(|leg| leg.start_location.as_ref())
            .and_then(Location::point),
        snapped_destination: route
            .legs
            .last()
            .and_then(|leg| leg.end_location.as_ref())
            .and_then(Location::point),
        warnings: route.warnings,
    };
    Ok(RouteResult {
        seconds: whole_seconds(seconds)?,
        details,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_success() {
        let body = r#"{"routes":[{"duration":"2224s"}]}"#;
        let result = parse(StatusCode::OK, body.as_bytes()).unwrap();
        assert_eq!(result.seconds, 2224);
        assert!(result.details.is_empty());
    }

    #[test]
    fn test_parse_route_details() {
        let body = r#"{"routes":[{
            "duration":"2224s",
            "distanceMeters":15230,
            "warnings":["This route has restricted usage or private roads."],
            "legs":[{
                "startLocation":{"latLng":{"latitude":51.4615,"longitude":-0.1121}},
                "endLocation":{"latLng":{"latitude":51.5168,"longitude":-0.0937}}
            }]
        }]}"#;
        let result = parse(StatusCode::OK, body.as_bytes()).unwrap();
        assert_eq!(result.seconds, 2224);
        let details = result.details;
        assert_eq!(details.distance_meters, Some(15230));
        assert_eq!(
            details.snapped_origin,
            Some(Coordinates::new(51.4615, -0.1121).unwrap())
        );
        assert_eq!(
            details.snapped_destination,
            Some(Coordinates::new(51.5168, -0.0937).unwrap())
        );
        assert_eq!(details.warnings.len(), 1);
    }

    #[test]
    fn test_parse_leg_without_location() {
        let body = r#"{"routes":[{"duration":"60s","legs":[{"startLocation":{}}]}]}"#;
        let details = parse(StatusCode::OK, body.as_bytes()).unwrap().details;
        assert_eq!(details.snapped_origin, None);
        assert_eq!(details.snapped_destination, None);
    }

    #[test]
    fn test_parse_fractional_duration() {
        let body = r#"{"routes":[{"duration":"1831.6s"}]}"#;
        assert_eq!(parse(StatusCode::OK, body.as_bytes()).unwrap().seconds, 1832);
    }

    #[test]
    fn test_parse_empty_object_is_no_route() {
        assert!(matches!(
            parse(StatusCode::OK, b"{}"),
            Err(FetchError::NoRouteFound { .. })
        ));
    }

    #[test]
    fn test_parse_bad_duration_is_malformed() {
        let body = r#"{"routes":[{"duration":"soon"}]}"#;
        assert!(matches!(
            parse(StatusCode::OK, body.as_bytes()),
            Err(FetchError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_parse_invalid_key() {
        let body = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.",
            "status":"INVALID_ARGUMENT","details":[{"@type":"type.googleapis.com/google.rpc.ErrorInfo",
            "reason":"API_KEY_INVALID"}]}}"#;
        assert!(matches!(
            parse(StatusCode::BAD_REQUEST, body.as_bytes()),
            Err(FetchError::Authentication { .. })
        ));
    }

    #[test]
    fn test_parse_past_departure_is_invalid_request() {
        let body = r#"{"error":{"code":400,"message":"Timestamp must be set to a future time.","status":"INVALID_ARGUMENT"}}"#;
        assert!(matches!(
            parse(StatusCode::BAD_REQUEST, body.as_bytes()),
            Err(FetchError::InvalidRequest { status: 400, .. })
        ));
    }

    #[test]
    fn test_request_sets_field_mask() {
        let google = Google::new(Url::parse(Google::DEFAULT_ENDPOINT).unwrap());
        let point = Coordinates::new(51.5, -0.1).unwrap();
        let departure = DateTime::parse_from_rfc3339("2024-05-01T08:00:00+01:00").unwrap();
        let request = google.request(point, point, departure).unwrap();
        let mask = request.headers()["X-Goog-FieldMask"].to_str().unwrap();
        assert!(mask.starts_with("routes.duration,routes.distanceMeters,routes.warnings,"));
        assert!(mask.ends_with("routes.legs.endLocation"));
        assert!(!mask.contains(' '));
        let body: serde_json::Value =
            serde_json::from_slice(request.body().unwrap().as_bytes().unwrap()).unwrap();
        assert_eq!(body["departureTime"], "2024-05-01T08:00:00+01:00");
        assert_eq!(body["origin"]["location"]["latLng"]["latitude"], 51.5);
    }
}
