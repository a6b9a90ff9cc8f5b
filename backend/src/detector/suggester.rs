//! Alarm suggester: turns clusters of same-metric anomalies into
//! threshold proposals with calibrated confidence.
//!
//! Pure over its inputs; the detector feeds it the anomalies found for
//! one location in the current run.

use chrono::Utc;

use shared::{AlarmSuggestion, Anomaly, Operator};

use super::stats::{mean, sample_stddev};

/// Derive alarm suggestions from the anomalies of one location.
///
/// Anomalies are grouped by metric type; groups below `min_count` are
/// dropped, and the per-metric rules decide threshold and direction.
pub fn suggest_alarms(
    anomalies: &[Anomaly],
    location: &str,
    min_count: usize,
) -> Vec<AlarmSuggestion> {
    if anomalies.is_empty() {
        return Vec::new();
    }

    let mut metric_types: Vec<&str> = anomalies.iter().map(|a| a.metric_type.as_str()).collect();
    metric_types.sort_unstable();
    metric_types.dedup();

    let mut suggestions = Vec::new();

    for metric_type in metric_types {
        let values: Vec<f64> = anomalies
            .iter()
            .filter(|a| a.metric_type == metric_type)
            .map(|a| a.value)
            .collect();

        if values.len() < min_count {
            continue;
        }

        if let Some(suggestion) = generate_suggestion(metric_type, &values, location) {
            suggestions.push(suggestion);
        }
    }

    suggestions
}

/// Per-metric threshold rules over the anomaly group's values.
fn generate_suggestion(
    metric_type: &str,
    values: &[f64],
    location: &str,
) -> Option<AlarmSuggestion> {
    let mean = mean(values);
    let stddev = sample_stddev(values, mean);

    let (threshold, operator, description) = match metric_type {
        "temperature_2m" => {
            if mean > 30.0 {
                (
                    mean + 2.0 * stddev,
                    Operator::GreaterThan,
                    "Temperature exceeding safe operational limits",
                )
            } else if mean < 0.0 {
                (
                    mean - 2.0 * stddev,
                    Operator::LessThan,
                    "Temperature dropping below safe operational limits",
                )
            } else {
                return None;
            }
        }
        "relative_humidity_2m" => {
            if mean > 80.0 {
                (
                    mean + stddev,
                    Operator::GreaterThan,
                    "Humidity levels becoming excessive",
                )
            } else if mean < 20.0 {
                (
                    mean - stddev,
                    Operator::LessThan,
                    "Humidity levels dropping dangerously low",
                )
            } else {
                return None;
            }
        }
        "precipitation" => (
            mean + 2.0 * stddev,
            Operator::GreaterThan,
            "Precipitation exceeding normal levels",
        ),
        "wind_speed_10m" => (
            mean + 2.0 * stddev,
            Operator::GreaterThan,
            "Wind speed reaching dangerous levels",
        ),
        _ => return None,
    };

    Some(AlarmSuggestion {
        id: 0,
        location: location.to_string(),
        metric_type: metric_type.to_string(),
        threshold,
        operator,
        suggested_at: Utc::now(),
        confidence: confidence(values, threshold, operator),
        description: description.to_string(),
        anomaly_count: values.len() as i64,
    })
}

/// Share of the group's values that would already trigger the suggested
/// alarm; captures future-trigger probability, not past fit.
fn confidence(values: &[f64], threshold: f64, operator: Operator) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let triggered = values
        .iter()
        .filter(|v| operator.triggers(**v, threshold))
        .count();

    triggered as f64 / values.len() as f64
}
