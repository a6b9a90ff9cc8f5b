//! Wire contract tests
//!
//! Pins the JSON shapes that cross process boundaries: the ingest
//! envelope consumed by the persister and the ML request/response pair
//! exchanged with the external worker.

use chrono::{TimeZone, Utc};
use serde_json::json;

use shared::{
    Forecast, IngestEnvelope, IngestMode, LocationRef, MlMetric, MlRequest, MlResponse,
};
use skywatch_server::detector::ml::{convert_response, job_id, scan_for_job};
use skywatch_server::stream::StreamMessage;

#[test]
fn ingest_envelope_matches_contract() {
    let forecast: Forecast = serde_json::from_value(json!({
        "latitude": 35.6762,
        "longitude": 139.6503,
        "hourly": {
            "time": ["2024-05-01T00:00"],
            "temperature_2m": [14.5]
        }
    }))
    .unwrap();

    let envelope = IngestEnvelope {
        location: LocationRef {
            name: "Tokyo".into(),
            latitude: 35.6762,
            longitude: 139.6503,
        },
        forecast,
        fields: vec!["temperature_2m".into(), "precipitation".into()],
        mode: IngestMode::Historical,
    };

    let value = serde_json::to_value(&envelope).unwrap();

    // Exactly the keys the persister contract names.
    assert_eq!(value["type"], "historical");
    assert_eq!(value["location"]["name"], "Tokyo");
    assert_eq!(value["location"]["latitude"], 35.6762);
    assert_eq!(value["fields"].as_array().unwrap().len(), 2);
    assert_eq!(value["forecast"]["hourly"]["temperature_2m"][0], 14.5);

    // And the persister can decode what the collector encodes.
    let decoded: IngestEnvelope = serde_json::from_value(value).unwrap();
    assert_eq!(decoded.mode, IngestMode::Historical);
    assert_eq!(decoded.forecast.hourly.time.len(), 1);
}

#[test]
fn current_envelope_uses_current_type_label() {
    let envelope = IngestEnvelope {
        location: LocationRef {
            name: "Tokyo".into(),
            latitude: 35.6762,
            longitude: 139.6503,
        },
        forecast: Forecast::default(),
        fields: vec!["temperature_2m".into()],
        mode: IngestMode::Current,
    };

    let value = serde_json::to_value(&envelope).unwrap();
    assert_eq!(value["type"], "current");
}

#[test]
fn ml_request_serializes_rfc3339_timestamps() {
    let request = MlRequest {
        job_id: job_id("Paris", 1_700_000_000),
        location: "Paris".into(),
        metrics: vec![MlMetric {
            timestamp: Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap(),
            metric_type: "temperature_2m".into(),
            value: 12.5,
        }],
    };

    let value = serde_json::to_value(&request).unwrap();
    assert_eq!(value["job_id"], "Paris_1700000000");
    assert_eq!(value["location"], "Paris");
    assert_eq!(value["metrics"][0]["timestamp"], "2023-11-14T22:13:20Z");
    assert_eq!(value["metrics"][0]["metric_type"], "temperature_2m");
    assert_eq!(value["metrics"][0]["value"], 12.5);
}

#[test]
fn ml_response_round_trip_to_anomalies() {
    let raw = r#"{
        "job_id": "Paris_1700000000",
        "location": "Paris",
        "models_saved": 5,
        "total_anomalies_found": 1,
        "anomalies": [{
            "timestamp": "2023-11-14T22:13:20+00:00",
            "metric_type": "wind_speed_10m",
            "value": 88.0,
            "anomaly_score": -0.71,
            "severity": "high"
        }],
        "metrics_processed": ["wind_speed_10m"]
    }"#;

    let response: MlResponse = serde_json::from_str(raw).unwrap();
    let anomalies = convert_response(&response, "Paris");

    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0].location, "Paris");
    assert_eq!(anomalies[0].score, -0.71);
    assert_eq!(anomalies[0].severity, shared::Severity::High);
    assert_eq!(anomalies[0].source, shared::AnomalySource::Ml);
}

/// A response already sitting at the stream tail for another job is
/// inspected exactly once and skipped; the matching response that arrives
/// later is accepted. No cross-job pickup.
#[test]
fn co_mingled_responses_do_not_cross_contaminate() {
    let paris_job = "Paris_1700000000";
    let other = r#"{"job_id":"Berlin_1699999999","location":"Berlin","anomalies":[]}"#;
    let ours = format!(
        r#"{{"job_id":"{}","location":"Paris","anomalies":[]}}"#,
        paris_job
    );

    // Cursor captured at the pre-existing tail: the unrelated response.
    let mut cursor = "10-0".to_string();

    // First poll sees only the stale unrelated entry... nothing matches.
    let first_batch = vec![StreamMessage {
        id: "11-0".into(),
        data: Some(other.into()),
    }];
    assert!(scan_for_job(&first_batch, paris_job, &mut cursor).is_none());
    assert_eq!(cursor, "11-0");

    // ...second poll starts after it and finds our response.
    let second_batch = vec![StreamMessage {
        id: "12-0".into(),
        data: Some(ours),
    }];
    let matched = scan_for_job(&second_batch, paris_job, &mut cursor).unwrap();
    assert_eq!(matched.job_id, paris_job);
    assert_eq!(matched.location, "Paris");
    assert_eq!(cursor, "12-0");
}
