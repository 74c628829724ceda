mod support;

use std::fs;
use std::time::Duration;

use drive_time_comparison::analysis::snapping::{BAD_SNAP_THRESHOLD_METERS, CaseCategory, categorize};
use drive_time_comparison::analysis::{ComparisonEngine, Mode};
use drive_time_comparison::config::ProviderId::{Google, Osrm, TravelTime};
use drive_time_comparison::config::ProvidersConfig;
use drive_time_comparison::departure::{DepartureSpec, DepartureTimes};
use drive_time_comparison::fetch::SharedClient;
use drive_time_comparison::orchestrator::{FetchOrchestrator, ProviderLane, RetryPolicy};
use drive_time_comparison::output::{read_dataset, write_dataset};
use reqwest::Request;
use support::*;

fn lanes(config: &ProvidersConfig, client: SharedClient) -> Vec<ProviderLane> {
    config
        .providers
        .iter()
        .map(|p| ProviderLane::from_config(p, client.clone()).unwrap())
        .collect()
}

/// Sample scenario: first route 1970 vs 2224, second 1868 vs 1832.
fn sample_backend(req: &Request) -> (u16, String) {
    let first = origin_lat(req) == FIRST_ORIGIN_LAT;
    match req.url().host_str() {
        Some("traveltime.test") => (200, traveltime_body(if first { 1970 } else { 1868 })),
        Some("google.test") => (200, google_body(if first { 2224 } else { 1832 })),
        Some("osrm.test") => (200, osrm_body(if first { 1900 } else { 1800 })),
        other => panic!("unexpected host {other:?}"),
    }
}

#[tokio::test]
async fn test_full_pipeline() {
    let config = providers(false, None);
    let client = ScriptedClient::new(sample_backend);
    let orchestrator = FetchOrchestrator::new(lanes(&config, client.clone()), RetryPolicy::default());

    let (dataset, report) = orchestrator.run(&sample_pairs(), &noon_departures()).await;
    assert_eq!(report.total_failed(), 0);
    assert_eq!(dataset.len(), 2);

    // credentials reach the wire through the auth decorators
    let seen = client.seen.lock().unwrap();
    let tt = seen
        .iter()
        .find(|s| s.url.host_str() == Some("traveltime.test"))
        .unwrap();
    assert_eq!(tt.headers["X-Application-Id"], "app");
    assert_eq!(tt.headers["X-Api-Key"], "secret");
    let google = seen
        .iter()
        .find(|s| s.url.host_str() == Some("google.test"))
        .unwrap();
    assert_eq!(google.headers["X-Goog-Api-Key"], "gkey");
    drop(seen);

    let mode = Mode::Baseline(TravelTime);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("output.csv");
    let path = path.to_str().unwrap();
    write_dataset(path, &dataset, &mode.error_columns(&config.ids())).unwrap();

    let content = fs::read_to_string(path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(
        lines[0],
        "origin,destination,departure_time,traveltime_travel_time,google_travel_time,\
         error_percentage_traveltime_to_google"
    );
    assert_eq!(
        lines[1],
        "\"51.4614,-0.112\",\"51.5167,-0.0936\",2023-09-05 12:00:00+0100,1970,2224,11"
    );
    assert_eq!(
        lines[2],
        "\"51.5407,-0.1424\",\"51.4985,-0.1985\",2023-09-05 12:00:00+0100,1868,1832,1"
    );

    // skip-data-gathering path: same matrix from the file
    let engine = ComparisonEngine::new(mode);
    let reread = read_dataset(path, &config.ids()).unwrap();
    assert_eq!(engine.compare(&reread), engine.compare(&dataset));
}

#[tokio::test(start_paused = true)]
async fn test_provider_failing_one_row_leaves_cell_empty() {
    let config = providers(true, None);
    let client = ScriptedClient::new(|req: &Request| {
        if req.url().host_str() == Some("google.test") && origin_lat(req) != FIRST_ORIGIN_LAT {
            return (503, "backend unavailable".to_string());
        }
        sample_backend(req)
    });
    let orchestrator = FetchOrchestrator::new(lanes(&config, client.clone()), RetryPolicy::default());
    let (dataset, report) = orchestrator.run(&sample_pairs(), &noon_departures()).await;

    assert_eq!(report.failed(Google), 1);
    assert_eq!(report.providers[&Google].failures["transient_network"], 1);
    assert_eq!(client.requests_to("google.test").len(), 1 + 3);

    let second = &dataset.rows()[1];
    assert_eq!(second.get(Google), None);
    assert_eq!(second.get(TravelTime), Some(1868));
    assert_eq!(second.get(Osrm), Some(1800));

    let mode = Mode::Baseline(TravelTime);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("output.csv");
    let path = path.to_str().unwrap();
    write_dataset(path, &dataset, &mode.error_columns(&config.ids())).unwrap();
    let content = fs::read_to_string(path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert!(lines[0].ends_with("error_percentage_traveltime_to_google,error_percentage_traveltime_to_osrm"));
    // |1868 - 1800| / 1800 = 3.8%
    assert!(lines[2].ends_with(",1868,,1800,,3"));

    let comparison = ComparisonEngine::new(mode).compare(&dataset);
    assert_eq!(comparison.matrix.get(Google, TravelTime).unwrap().samples, 1);
    assert_eq!(comparison.matrix.get(Osrm, TravelTime).unwrap().samples, 2);
}

#[tokio::test]
async fn test_rejected_credentials_abandon_only_that_provider() {
    let config = providers(true, None);
    let client = ScriptedClient::new(|req: &Request| {
        if req.url().host_str() == Some("google.test") {
            return (
                403,
                r#"{"error":{"code":403,"message":"The caller does not have permission","status":"PERMISSION_DENIED"}}"#
                    .to_string(),
            );
        }
        sample_backend(req)
    });
    let orchestrator = FetchOrchestrator::new(lanes(&config, client.clone()), RetryPolicy::default());
    let (dataset, report) = orchestrator.run(&sample_pairs(), &noon_departures()).await;

    assert_eq!(report.abandoned(), vec![Google]);
    assert_eq!(report.failed(Google), 2);
    assert_eq!(report.failed(TravelTime), 0);
    assert_eq!(report.failed(Osrm), 0);
    assert!(dataset.rows().iter().all(|r| r.get(Google).is_none()));
    assert!(dataset.rows().iter().all(|r| r.get(TravelTime).is_some()));

    // authentication is never retried
    assert!(client.requests_to("google.test").len() <= 2);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_provider_spreads_requests() {
    let config = providers(true, Some(60));
    let client = ScriptedClient::new(sample_backend);
    let orchestrator = FetchOrchestrator::new(lanes(&config, client.clone()), RetryPolicy::default());

    let pairs: Vec<_> = (0..3).flat_map(|_| sample_pairs()).collect();
    let window = DepartureTimes::window("08:00", "09:00", 30).unwrap();
    let departures = DepartureSpec::new("2023-09-05", "UTC", window)
        .unwrap()
        .instants()
        .unwrap();
    let (dataset, report) = orchestrator.run(&pairs, &departures).await;

    // duplicate pairs collapse into the same rows
    assert_eq!(dataset.len(), 2 * 3);
    assert_eq!(report.total_failed(), 0);

    let mut osrm = client.requests_to("osrm.test");
    osrm.sort();
    assert_eq!(osrm.len(), 6);
    for window in osrm.windows(2) {
        assert!(window[1] - window[0] >= Duration::from_secs(1));
    }

    // unbounded providers are not held back by OSRM's budget
    let google = client.requests_to("google.test");
    let first = *google.iter().min().unwrap();
    assert!(google.iter().all(|&t| t == first));
}

#[tokio::test]
async fn test_every_task_reaches_a_terminal_state() {
    let config = providers(true, None);
    let client = ScriptedClient::new(|req: &Request| match req.url().host_str() {
        Some("osrm.test") => (200, r#"{"code":"NoRoute","message":"Impossible route"}"#.to_string()),
        Some("google.test") => (200, "not json".to_string()),
        _ => sample_backend(req),
    });
    let orchestrator = FetchOrchestrator::new(lanes(&config, client), RetryPolicy::default());
    let (dataset, report) = orchestrator.run(&sample_pairs(), &noon_departures()).await;

    let counted: usize = report
        .providers
        .values()
        .map(|t| t.succeeded + t.failed)
        .sum();
    assert_eq!(counted, dataset.len() * 3);
    assert_eq!(report.providers[&Osrm].failures["no_route_found"], 2);
    assert_eq!(report.providers[&Google].failures["malformed_response"], 2);
    assert_eq!(report.providers[&TravelTime].succeeded, 2);
}

#[tokio::test]
async fn test_google_snapping_reaches_csv_and_categories() {
    let config = providers(false, None);
    let client = ScriptedClient::new(|req: &Request| {
        let first = origin_lat(req) == FIRST_ORIGIN_LAT;
        match req.url().host_str() {
            // first origin placed about 300 m north of the request
            Some("google.test") if first => (
                200,
                google_body_snapped(2224, (51.4641, -0.1120), (51.5167, -0.0936)),
            ),
            _ => sample_backend(req),
        }
    });
    let orchestrator = FetchOrchestrator::new(lanes(&config, client), RetryPolicy::default());
    let (dataset, _) = orchestrator.run(&sample_pairs(), &noon_departures()).await;

    assert_eq!(
        categorize(&dataset, BAD_SNAP_THRESHOLD_METERS),
        vec![CaseCategory::BadSnapOrigin, CaseCategory::Clean]
    );

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapped.csv");
    let path = path.to_str().unwrap();
    write_dataset(path, &dataset, &[]).unwrap();

    let content = fs::read_to_string(path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(
        lines[0],
        "origin,destination,departure_time,traveltime_travel_time,google_travel_time,\
         google_distance,google_snapped_origin,google_snapped_destination"
    );
    assert_eq!(
        lines[1],
        "\"51.4614,-0.112\",\"51.5167,-0.0936\",2023-09-05 12:00:00+0100,1970,2224,15230,\
         \"51.4641,-0.112\",\"51.5167,-0.0936\""
    );
    assert!(lines[2].ends_with(",1868,1832,,,"));

    // an analysis-only run sees the same categories
    let read = read_dataset(path, &config.ids()).unwrap();
    assert_eq!(
        categorize(&read, BAD_SNAP_THRESHOLD_METERS),
        vec![CaseCategory::BadSnapOrigin, CaseCategory::Clean]
    );
}
