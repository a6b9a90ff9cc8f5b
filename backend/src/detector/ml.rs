//! ML detection pass: request/response exchange with the external ML
//! worker over a shared pair of streams.
//!
//! Responses for many jobs are co-mingled on one output stream, so the
//! pass records the stream's tail id *before* publishing its request and
//! only reads forward from there. Every inspected entry advances the
//! cursor, which keeps each entry inspected at most once; correlation is
//! by `job_id` alone.

use chrono::{Duration, Utc};
use tokio::time::{sleep_until, Instant};

use shared::{Anomaly, AnomalySource, MlMetric, MlRequest, MlResponse, Observation};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::shutdown::Shutdown;
use crate::store::Store;
use crate::stream::StreamBus;

/// Entries inspected per poll tick
const POLL_COUNT: usize = 10;

/// Build the correlation key for one detection job.
pub fn job_id(location: &str, unix_seconds: i64) -> String {
    format!("{}_{}", location, unix_seconds)
}

/// Convert a matched ML response into anomaly rows.
///
/// The ML worker's `anomaly_score` is stored verbatim as the score and its
/// severity label is honored as long as it is inside the closed set;
/// entries with unknown severities are logged and dropped.
pub fn convert_response(response: &MlResponse, location: &str) -> Vec<Anomaly> {
    response
        .anomalies
        .iter()
        .filter_map(|entry| {
            let severity = match entry.severity.parse() {
                Ok(severity) => severity,
                Err(e) => {
                    tracing::warn!(location, error = %e, "dropping ML anomaly entry");
                    return None;
                }
            };
            Some(Anomaly {
                id: 0,
                location: location.to_string(),
                timestamp: entry.timestamp,
                metric_type: entry.metric_type.clone(),
                value: entry.value,
                score: entry.anomaly_score,
                severity,
                source: AnomalySource::Ml,
            })
        })
        .collect()
}

/// Run the ML pass for one location.
///
/// Returns an empty list when there is too little training data; returns
/// [`AppError::MlTimeout`] when no matching response arrives before the
/// deadline. Either way, sibling locations are unaffected.
pub async fn ml_anomalies(
    store: &Store,
    bus: &StreamBus,
    config: &Config,
    location: &str,
    shutdown: &mut Shutdown,
) -> AppResult<Vec<Anomaly>> {
    let detector = &config.detector;
    let since = Utc::now() - Duration::days(detector.training_days);
    let observations = store
        .get_observations(location, &config.weather.monitored_fields, since)
        .await?;

    if observations.len() < detector.min_training_samples {
        tracing::debug!(
            location,
            samples = observations.len(),
            needed = detector.min_training_samples,
            "not enough data for ML detection"
        );
        return Ok(Vec::new());
    }

    let request = build_request(location, &observations);

    // Capture the response tail before publishing so the wait loop reads
    // strictly forward from the submission point.
    let mut cursor = bus.tail_id(&config.redis.ml_output_stream).await?;
    bus.publish_json(&config.redis.ml_input_stream, &request)
        .await?;

    tracing::info!(
        location,
        job_id = %request.job_id,
        metrics = request.metrics.len(),
        "published ML detection job"
    );

    let job_id = request.job_id;
    let deadline = Instant::now() + std::time::Duration::from_secs(detector.ml_timeout_secs);
    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(
        detector.ml_poll_interval_ms.max(1),
    ));

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.cancelled() => return Err(AppError::Cancelled),
            _ = sleep_until(deadline) => {
                return Err(AppError::MlTimeout { job_id });
            }
        }

        let messages = bus
            .read_after(&config.redis.ml_output_stream, &cursor, POLL_COUNT)
            .await?;

        if let Some(response) = scan_for_job(&messages, &job_id, &mut cursor) {
            tracing::info!(
                location,
                job_id = %response.job_id,
                models_saved = response.models_saved,
                anomalies = response.total_anomalies_found,
                "matched ML response"
            );

            // Housekeeping after a successful match; failures are logged
            // inside trim and never propagate.
            bus.trim(&config.redis.ml_input_stream, config.redis.ml_maxlen)
                .await;
            bus.trim(&config.redis.ml_output_stream, config.redis.ml_maxlen)
                .await;

            return Ok(convert_response(&response, location));
        }
    }
}

/// Scan one batch of output-stream entries for `job_id`.
///
/// The cursor advances past every entry inspected, matched or not, so no
/// entry is ever inspected twice across poll ticks.
pub fn scan_for_job(
    messages: &[crate::stream::StreamMessage],
    job_id: &str,
    cursor: &mut String,
) -> Option<MlResponse> {
    for message in messages {
        *cursor = message.id.clone();

        let Some(data) = message.data.as_deref() else {
            tracing::warn!(id = %message.id, "ML response has no data field");
            continue;
        };

        let response: MlResponse = match serde_json::from_str(data) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(id = %message.id, error = %e, "failed to parse ML response");
                continue;
            }
        };

        if response.job_id != job_id {
            tracing::debug!(job_id, seen = %response.job_id, "skipping response for another job");
            continue;
        }

        return Some(response);
    }

    None
}

/// Shape the training window into the ML request envelope.
pub fn build_request(location: &str, observations: &[Observation]) -> MlRequest {
    MlRequest {
        job_id: job_id(location, Utc::now().timestamp()),
        location: location.to_string(),
        metrics: observations
            .iter()
            .map(|obs| MlMetric {
                timestamp: obs.timestamp,
                metric_type: obs.metric_type.clone(),
                value: obs.value,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use shared::MlAnomaly;

    #[test]
    fn job_id_format_is_location_and_unix_seconds() {
        assert_eq!(job_id("Paris", 1_700_000_000), "Paris_1700000000");
        assert_eq!(job_id("New York", 7), "New York_7");
    }

    #[test]
    fn convert_keeps_ml_score_and_severity_verbatim() {
        let response = MlResponse {
            job_id: "Paris_1700000000".into(),
            location: "Paris".into(),
            models_saved: 2,
            total_anomalies_found: 2,
            anomalies: vec![
                MlAnomaly {
                    timestamp: Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap(),
                    metric_type: "temperature_2m".into(),
                    value: 31.5,
                    anomaly_score: -0.62,
                    severity: "high".into(),
                },
                MlAnomaly {
                    timestamp: Utc.with_ymd_and_hms(2023, 11, 14, 23, 13, 20).unwrap(),
                    metric_type: "precipitation".into(),
                    value: 12.0,
                    anomaly_score: -0.31,
                    severity: "medium".into(),
                },
            ],
            metrics_processed: vec!["temperature_2m".into(), "precipitation".into()],
        };

        let anomalies = convert_response(&response, "Paris");
        assert_eq!(anomalies.len(), 2);
        assert_eq!(anomalies[0].score, -0.62);
        assert_eq!(anomalies[0].severity, shared::Severity::High);
        assert_eq!(anomalies[0].source, AnomalySource::Ml);
        assert_eq!(anomalies[1].metric_type, "precipitation");
    }

    #[test]
    fn convert_drops_entries_with_unknown_severity() {
        let response = MlResponse {
            job_id: "Lima_1".into(),
            location: "Lima".into(),
            models_saved: 1,
            total_anomalies_found: 1,
            anomalies: vec![MlAnomaly {
                timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                metric_type: "temperature_2m".into(),
                value: 5.0,
                anomaly_score: -0.9,
                severity: "catastrophic".into(),
            }],
            metrics_processed: vec![],
        };

        assert!(convert_response(&response, "Lima").is_empty());
    }

    fn message(id: &str, json: &str) -> crate::stream::StreamMessage {
        crate::stream::StreamMessage {
            id: id.to_string(),
            data: Some(json.to_string()),
        }
    }

    fn response_json(job_id: &str) -> String {
        format!(
            r#"{{"job_id":"{}","location":"Paris","models_saved":0,"total_anomalies_found":0,"anomalies":[],"metrics_processed":[]}}"#,
            job_id
        )
    }

    #[test]
    fn scan_matches_only_its_own_job() {
        let messages = vec![
            message("1-0", &response_json("Berlin_999")),
            message("2-0", &response_json("Paris_1700000000")),
            message("3-0", &response_json("Lima_123")),
        ];

        let mut cursor = "0-0".to_string();
        let matched = scan_for_job(&messages, "Paris_1700000000", &mut cursor).unwrap();
        assert_eq!(matched.job_id, "Paris_1700000000");
        assert_eq!(cursor, "2-0");
    }

    #[test]
    fn scan_advances_cursor_past_unmatched_entries() {
        let messages = vec![
            message("5-0", &response_json("Berlin_999")),
            message("6-0", "not json at all"),
            message("7-0", &response_json("Lima_123")),
        ];

        let mut cursor = "0-0".to_string();
        assert!(scan_for_job(&messages, "Paris_1700000000", &mut cursor).is_none());
        // Every entry was inspected once; the next read starts after the
        // last of them.
        assert_eq!(cursor, "7-0");
    }

    #[test]
    fn scan_of_empty_batch_leaves_cursor_alone() {
        let mut cursor = "4-2".to_string();
        assert!(scan_for_job(&[], "Paris_1", &mut cursor).is_none());
        assert_eq!(cursor, "4-2");
    }

    #[test]
    fn build_request_carries_every_observation() {
        let observations: Vec<Observation> = (0..12)
            .map(|i| Observation {
                id: i,
                location: "Paris".into(),
                timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 0, i as u32, 0).unwrap(),
                metric_type: "temperature_2m".into(),
                value: 10.0 + i as f64,
            })
            .collect();

        let request = build_request("Paris", &observations);
        assert_eq!(request.location, "Paris");
        assert_eq!(request.metrics.len(), 12);
        assert!(request.job_id.starts_with("Paris_"));
    }
}
