//! Wire envelopes carried on the redis streams.
//!
//! These types are transport-only: the ingest envelope moves one upstream
//! API result from the collector to the persister, and the ML request and
//! response pair moves a detection job to the external ML worker and back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Forecast;
use crate::types::IngestMode;

/// Location reference embedded in the ingest envelope
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationRef {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// One collector result on its way to the persister
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestEnvelope {
    pub location: LocationRef,
    pub forecast: Forecast,
    pub fields: Vec<String>,
    #[serde(rename = "type")]
    pub mode: IngestMode,
}

/// One observation sample inside an ML request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MlMetric {
    pub timestamp: DateTime<Utc>,
    pub metric_type: String,
    pub value: f64,
}

/// Detection job published to the ML input stream.
///
/// `job_id` is `<location>_<unix_seconds>` and is the correlation key the
/// detector matches responses against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MlRequest {
    pub job_id: String,
    pub location: String,
    pub metrics: Vec<MlMetric>,
}

/// One anomaly entry inside an ML response.
///
/// Severity arrives as a free-form string; entries outside the closed
/// severity set are dropped at conversion time, not here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MlAnomaly {
    pub timestamp: DateTime<Utc>,
    pub metric_type: String,
    pub value: f64,
    pub anomaly_score: f64,
    pub severity: String,
}

/// Completed detection job read back from the ML output stream
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MlResponse {
    pub job_id: String,
    pub location: String,
    #[serde(default)]
    pub models_saved: i64,
    #[serde(default)]
    pub total_anomalies_found: i64,
    #[serde(default)]
    pub anomalies: Vec<MlAnomaly>,
    #[serde(default)]
    pub metrics_processed: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_envelope_wire_format() {
        let envelope = IngestEnvelope {
            location: LocationRef {
                name: "Tokyo".into(),
                latitude: 35.6762,
                longitude: 139.6503,
            },
            forecast: Forecast::default(),
            fields: vec!["temperature_2m".into()],
            mode: IngestMode::Historical,
        };

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["type"], "historical");
        assert_eq!(json["location"]["name"], "Tokyo");
        assert_eq!(json["fields"][0], "temperature_2m");

        let back: IngestEnvelope = serde_json::from_value(json).unwrap();
        assert_eq!(back, envelope);
    }

    #[test]
    fn ml_response_decodes_worker_wire_json() {
        let raw = r#"{
            "job_id": "Paris_1700000000",
            "location": "Paris",
            "models_saved": 4,
            "total_anomalies_found": 1,
            "anomalies": [{
                "timestamp": "2023-11-14T22:13:20Z",
                "metric_type": "temperature_2m",
                "value": 31.5,
                "anomaly_score": -0.62,
                "severity": "high"
            }],
            "metrics_processed": ["temperature_2m", "precipitation"]
        }"#;

        let response: MlResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.job_id, "Paris_1700000000");
        assert_eq!(response.anomalies.len(), 1);
        assert_eq!(response.anomalies[0].anomaly_score, -0.62);
        assert_eq!(response.anomalies[0].severity, "high");
    }

    #[test]
    fn ml_response_tolerates_missing_optional_blocks() {
        let raw = r#"{"job_id": "Lima_1700000001", "location": "Lima"}"#;
        let response: MlResponse = serde_json::from_str(raw).unwrap();
        assert!(response.anomalies.is_empty());
        assert_eq!(response.total_anomalies_found, 0);
    }
}
