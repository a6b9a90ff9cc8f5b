//! Statistical anomaly pass: z-scores of the recent window against a
//! multi-day baseline, computed per metric type.

use std::collections::HashMap;

use chrono::{Duration, Utc};

use shared::{Anomaly, AnomalySource, Observation, Severity};

use crate::config::DetectorConfig;
use crate::error::AppResult;
use crate::store::Store;

/// Minimum baseline samples before a metric is worth analyzing
const MIN_BASELINE_SAMPLES: usize = 3;

/// Arithmetic mean; 0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Two-pass sample standard deviation (divisor n-1); 0 below two samples.
pub fn sample_stddev(values: &[f64], mean: f64) -> f64 {
    if values.len() <= 1 {
        return 0.0;
    }
    let variance = values
        .iter()
        .map(|v| (v - mean) * (v - mean))
        .sum::<f64>()
        / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Z-score of `value` against the baseline statistics.
pub fn zscore(value: f64, mean: f64, stddev: f64) -> f64 {
    if stddev == 0.0 {
        return 0.0;
    }
    (value - mean) / stddev
}

/// Severity bucket for a z-score magnitude.
pub fn severity_for_zscore(z: f64) -> Severity {
    let magnitude = z.abs();
    if magnitude > 2.0 {
        Severity::High
    } else if magnitude > 1.5 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Read baseline and recent windows for `location` and flag every recent
/// reading whose z-score magnitude exceeds the configured cutoff.
pub async fn stat_anomalies(
    store: &Store,
    config: &DetectorConfig,
    monitored_fields: &[String],
    location: &str,
) -> AppResult<Vec<Anomaly>> {
    let now = Utc::now();
    let baseline_since = now - Duration::days(config.baseline_days);
    let recent_since = now - Duration::hours(config.recent_hours);

    let baseline = store
        .get_observations(location, monitored_fields, baseline_since)
        .await?;
    let recent = store
        .get_observations(location, monitored_fields, recent_since)
        .await?;

    Ok(flag_recent(
        &baseline,
        &recent,
        monitored_fields,
        config.zscore_cutoff,
        location,
    ))
}

/// Pure core of the statistical pass, split out for direct testing.
pub fn flag_recent(
    baseline: &[Observation],
    recent: &[Observation],
    monitored_fields: &[String],
    zscore_cutoff: f64,
    location: &str,
) -> Vec<Anomaly> {
    let baseline_by_type = group_values(baseline);
    let recent_by_type = group_refs(recent);

    let mut anomalies = Vec::new();

    for metric_type in monitored_fields {
        let Some(values) = baseline_by_type.get(metric_type.as_str()) else {
            continue;
        };

        if values.len() < MIN_BASELINE_SAMPLES {
            tracing::debug!(
                location,
                %metric_type,
                samples = values.len(),
                "not enough baseline data"
            );
            continue;
        }

        let mean = mean(values);
        let stddev = sample_stddev(values, mean);
        if stddev == 0.0 {
            tracing::debug!(location, %metric_type, "no variation in baseline");
            continue;
        }

        let Some(recent_for_type) = recent_by_type.get(metric_type.as_str()) else {
            continue;
        };

        for observation in recent_for_type {
            let z = zscore(observation.value, mean, stddev);
            if z.abs() > zscore_cutoff {
                anomalies.push(Anomaly {
                    id: 0,
                    location: location.to_string(),
                    timestamp: observation.timestamp,
                    metric_type: metric_type.clone(),
                    value: observation.value,
                    score: z,
                    severity: severity_for_zscore(z),
                    source: AnomalySource::Stat,
                });
            }
        }
    }

    anomalies
}

fn group_values(observations: &[Observation]) -> HashMap<&str, Vec<f64>> {
    let mut by_type: HashMap<&str, Vec<f64>> = HashMap::new();
    for obs in observations {
        by_type.entry(obs.metric_type.as_str()).or_default().push(obs.value);
    }
    by_type
}

fn group_refs(observations: &[Observation]) -> HashMap<&str, Vec<&Observation>> {
    let mut by_type: HashMap<&str, Vec<&Observation>> = HashMap::new();
    for obs in observations {
        by_type.entry(obs.metric_type.as_str()).or_default().push(obs);
    }
    by_type
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn obs(metric_type: &str, value: f64, minute: u32) -> Observation {
        Observation {
            id: 0,
            location: "Denver".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap(),
            metric_type: metric_type.to_string(),
            value,
        }
    }

    fn fields() -> Vec<String> {
        vec!["temperature_2m".to_string()]
    }

    #[test]
    fn sample_stddev_uses_n_minus_1() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let m = mean(&values);
        assert!((m - 5.0).abs() < 1e-12);
        // Sample variance of this set is 32/7.
        let s = sample_stddev(&values, m);
        assert!((s - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn flags_outlier_with_expected_score_and_severity() {
        // Baseline alternates 12 and 18: mean 15, sample stddev ~3.05.
        let baseline: Vec<Observation> = (0..40)
            .map(|i| obs("temperature_2m", if i % 2 == 0 { 12.0 } else { 18.0 }, i))
            .collect();
        let m = mean(&baseline.iter().map(|o| o.value).collect::<Vec<_>>());
        let s = sample_stddev(&baseline.iter().map(|o| o.value).collect::<Vec<_>>(), m);

        let recent = vec![obs("temperature_2m", 25.0, 50)];
        let anomalies = flag_recent(&baseline, &recent, &fields(), 1.0, "Denver");

        assert_eq!(anomalies.len(), 1);
        let anomaly = &anomalies[0];
        assert!((anomaly.score - (25.0 - m) / s).abs() < 1e-12);
        assert_eq!(anomaly.severity, Severity::High);
        assert_eq!(anomaly.source, AnomalySource::Stat);
    }

    #[test]
    fn severity_boundaries_are_exact() {
        assert_eq!(severity_for_zscore(1.2), Severity::Low);
        assert_eq!(severity_for_zscore(1.5), Severity::Low);
        assert_eq!(severity_for_zscore(1.51), Severity::Medium);
        assert_eq!(severity_for_zscore(2.0), Severity::Medium);
        assert_eq!(severity_for_zscore(2.01), Severity::High);
        assert_eq!(severity_for_zscore(-3.2), Severity::High);
    }

    #[test]
    fn skips_metric_below_minimum_samples() {
        let baseline = vec![
            obs("temperature_2m", 10.0, 0),
            obs("temperature_2m", 20.0, 1),
        ];
        let recent = vec![obs("temperature_2m", 100.0, 2)];
        assert!(flag_recent(&baseline, &recent, &fields(), 1.0, "Denver").is_empty());
    }

    #[test]
    fn skips_metric_with_zero_variation() {
        let baseline: Vec<Observation> =
            (0..10).map(|i| obs("temperature_2m", 15.0, i)).collect();
        let recent = vec![obs("temperature_2m", 40.0, 11)];
        assert!(flag_recent(&baseline, &recent, &fields(), 1.0, "Denver").is_empty());
    }

    #[test]
    fn value_inside_cutoff_is_not_flagged() {
        let baseline: Vec<Observation> = (0..40)
            .map(|i| obs("temperature_2m", if i % 2 == 0 { 12.0 } else { 18.0 }, i))
            .collect();
        // z ~ 0.33 for 16.0, well inside the cutoff.
        let recent = vec![obs("temperature_2m", 16.0, 50)];
        assert!(flag_recent(&baseline, &recent, &fields(), 1.0, "Denver").is_empty());
    }

    #[test]
    fn unmonitored_metric_is_ignored() {
        let baseline: Vec<Observation> = (0..10)
            .map(|i| obs("weather_code", if i % 2 == 0 { 1.0 } else { 3.0 }, i))
            .collect();
        let recent = vec![obs("weather_code", 95.0, 11)];
        assert!(flag_recent(&baseline, &recent, &fields(), 1.0, "Denver").is_empty());
    }
}
