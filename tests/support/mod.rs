use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use drive_time_comparison::config::ProvidersConfig;
use drive_time_comparison::departure::{DepartureSpec, DepartureTimes};
use drive_time_comparison::fetch::HttpClient;
use drive_time_comparison::input::{RoutePair, parse_route_pairs};
use reqwest::header::HeaderMap;
use reqwest::{Request, Response, Url};
use tokio::time::Instant;

/// One request as seen by [`ScriptedClient`].
#[allow(dead_code)]
pub struct Seen {
    pub at: Instant,
    pub url: Url,
    pub headers: HeaderMap,
}

/// An in-memory provider backend answering with `respond(request)`.
pub struct ScriptedClient<F> {
    respond: F,
    pub seen: Mutex<Vec<Seen>>,
}

impl<F> ScriptedClient<F>
where
    F: Fn(&Request) -> (u16, String) + Send + Sync,
{
    pub fn new(respond: F) -> Arc<Self> {
        Arc::new(Self {
            respond,
            seen: Mutex::new(Vec::new()),
        })
    }

    #[allow(dead_code)]
    pub fn requests_to(&self, host: &str) -> Vec<Instant> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.url.host_str() == Some(host))
            .map(|s| s.at)
            .collect()
    }
}

#[async_trait]
impl<F> HttpClient for ScriptedClient<F>
where
    F: Fn(&Request) -> (u16, String) + Send + Sync,
{
    async fn execute(&self, req: Request) -> reqwest::Result<Response> {
        let (status, body) = (self.respond)(&req);
        self.seen.lock().unwrap().push(Seen {
            at: Instant::now(),
            url: req.url().clone(),
            headers: req.headers().clone(),
        });
        let response = http::Response::builder()
            .status(status)
            .body(body)
            .unwrap();
        Ok(response.into())
    }
}

/// Latitude of the request's origin, whatever the provider's wire shape.
pub fn origin_lat(req: &Request) -> f64 {
    if let Some(bytes) = req.body().and_then(|b| b.as_bytes()) {
        let body: serde_json::Value = serde_json::from_slice(bytes).unwrap();
        if let Some(lat) = body["locations"][0]["coords"]["lat"].as_f64() {
            return lat;
        }
        if let Some(lat) = body["origin"]["location"]["latLng"]["latitude"].as_f64() {
            return lat;
        }
    }
    // `{lng},{lat};{lng},{lat}` path segment
    let segment = req.url().path_segments().unwrap().last().unwrap().to_string();
    let origin = segment.split(';').next().unwrap();
    origin.split(',').nth(1).unwrap().parse().unwrap()
}

pub fn traveltime_body(seconds: u32) -> String {
    format!(
        r#"{{"results":[{{"search_id":"comparison","locations":[{{"id":"destination","properties":[{{"travel_time":{seconds}}}]}}],"unreachable":[]}}]}}"#
    )
}

pub fn google_body(seconds: u32) -> String {
    format!(r#"{{"routes":[{{"duration":"{seconds}s"}}]}}"#)
}

/// A Google route that reports its distance and where it snapped both ends.
pub fn google_body_snapped(seconds: u32, origin: (f64, f64), destination: (f64, f64)) -> String {
    format!(
        r#"{{"routes":[{{"duration":"{seconds}s","distanceMeters":15230,"legs":[{{
            "startLocation":{{"latLng":{{"latitude":{},"longitude":{}}}}},
            "endLocation":{{"latLng":{{"latitude":{},"longitude":{}}}}}
        }}]}}]}}"#,
        origin.0, origin.1, destination.0, destination.1
    )
}

pub fn osrm_body(seconds: u32) -> String {
    format!(r#"{{"code":"Ok","routes":[{{"legs":[{{"duration":{seconds}.0}}]}}]}}"#)
}

/// The two sample London routes used across scenarios.
pub fn sample_pairs() -> Vec<RoutePair> {
    let csv = "\
origin,destination
\"51.4614,-0.1120\",\"51.5167,-0.0936\"
\"51.5407,-0.1424\",\"51.4985,-0.1985\"
";
    parse_route_pairs(csv.as_bytes()).unwrap()
}

pub const FIRST_ORIGIN_LAT: f64 = 51.4614;

pub fn noon_departures() -> Vec<DateTime<FixedOffset>> {
    let times = DepartureTimes::parse_list("12:00").unwrap();
    DepartureSpec::new("2023-09-05", "Europe/London", times)
        .unwrap()
        .instants()
        .unwrap()
}

/// TravelTime, Google and optionally OSRM, all pointed at `.test` hosts.
pub fn providers(with_osrm: bool, osrm_rpm: Option<u32>) -> ProvidersConfig {
    let osrm_rpm = osrm_rpm.map_or("null".to_string(), |r| r.to_string());
    let json = format!(
        r#"{{
            "traveltime": {{
                "app-id": "app", "api-key": "secret",
                "api-endpoint": "http://traveltime.test"
            }},
            "api-providers": [
                {{ "name": "google", "enabled": true, "api-key": "gkey",
                   "api-endpoint": "http://google.test" }},
                {{ "name": "osrm", "enabled": {with_osrm}, "max-rpm": {osrm_rpm},
                   "api-endpoint": "http://osrm.test" }}
            ]
        }}"#
    );
    ProvidersConfig::parse(&json, |_| None).unwrap()
}
