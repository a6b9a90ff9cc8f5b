//! Open-Meteo forecast payload projection.
//!
//! Only the monitored fields are modeled; unknown upstream fields are
//! ignored on decode. The same structure travels inside the ingest
//! envelope, so the persister sees exactly what the client decoded.

use serde::{Deserialize, Serialize};

/// Weather forecast data as returned by the Open-Meteo forecast endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Forecast {
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default)]
    pub timezone: String,
    #[serde(default)]
    pub current: CurrentBlock,
    #[serde(default)]
    pub hourly: HourlyBlock,
    #[serde(default)]
    pub generation_time_ms: f64,
}

/// Single-point "current conditions" block; every field is optional
/// because the projection decides what the upstream returns
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CurrentBlock {
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub interval: Option<i64>,
    #[serde(default)]
    pub temperature_2m: Option<f64>,
    #[serde(default)]
    pub relative_humidity_2m: Option<f64>,
    #[serde(default)]
    pub precipitation: Option<f64>,
    #[serde(default)]
    pub wind_speed_10m: Option<f64>,
    #[serde(default)]
    pub dew_point_2m: Option<f64>,
}

/// Hourly archive block: `time` and each value series are aligned arrays
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HourlyBlock {
    #[serde(default)]
    pub time: Vec<String>,
    #[serde(default)]
    pub temperature_2m: Vec<f64>,
    #[serde(default)]
    pub relative_humidity_2m: Vec<f64>,
    #[serde(default)]
    pub precipitation: Vec<f64>,
    #[serde(default)]
    pub wind_speed_10m: Vec<f64>,
    #[serde(default)]
    pub dew_point_2m: Vec<f64>,
}

impl Forecast {
    /// Value series for a named hourly field, if the upstream returned it.
    pub fn hourly_series(&self, field: &str) -> Option<&[f64]> {
        let series = match field {
            "temperature_2m" => &self.hourly.temperature_2m,
            "relative_humidity_2m" => &self.hourly.relative_humidity_2m,
            "precipitation" => &self.hourly.precipitation,
            "wind_speed_10m" => &self.hourly.wind_speed_10m,
            "dew_point_2m" => &self.hourly.dew_point_2m,
            _ => return None,
        };
        Some(series.as_slice())
    }

    /// Current-conditions value for a named field, if present.
    pub fn current_value(&self, field: &str) -> Option<f64> {
        match field {
            "temperature_2m" => self.current.temperature_2m,
            "relative_humidity_2m" => self.current.relative_humidity_2m,
            "precipitation" => self.current.precipitation,
            "wind_speed_10m" => self.current.wind_speed_10m,
            "dew_point_2m" => self.current.dew_point_2m,
            _ => None,
        }
    }

    /// Whether a field name is one the forecast projection can carry.
    pub fn knows_field(field: &str) -> bool {
        matches!(
            field,
            "temperature_2m"
                | "relative_humidity_2m"
                | "precipitation"
                | "wind_speed_10m"
                | "dew_point_2m"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_current_payload_with_missing_fields() {
        let raw = r#"{
            "latitude": 35.6762,
            "longitude": 139.6503,
            "timezone": "UTC",
            "current": {
                "time": "2024-05-01T12:00",
                "interval": 900,
                "temperature_2m": 15.2,
                "relative_humidity_2m": 65
            }
        }"#;

        let forecast: Forecast = serde_json::from_str(raw).unwrap();
        assert_eq!(forecast.current_value("temperature_2m"), Some(15.2));
        assert_eq!(forecast.current_value("relative_humidity_2m"), Some(65.0));
        assert_eq!(forecast.current_value("precipitation"), None);
        assert!(forecast.hourly.time.is_empty());
    }

    #[test]
    fn decodes_hourly_payload() {
        let raw = r#"{
            "latitude": 39.7392,
            "longitude": -104.9903,
            "hourly": {
                "time": ["2024-05-01T00:00", "2024-05-01T01:00"],
                "temperature_2m": [12.1, 11.8],
                "precipitation": [0.0, 0.2]
            }
        }"#;

        let forecast: Forecast = serde_json::from_str(raw).unwrap();
        assert_eq!(forecast.hourly_series("temperature_2m").unwrap().len(), 2);
        assert_eq!(forecast.hourly_series("precipitation").unwrap(), &[0.0, 0.2]);
        assert!(forecast.hourly_series("relative_humidity_2m").unwrap().is_empty());
        assert!(forecast.hourly_series("weather_code").is_none());
    }

    #[test]
    fn knows_only_monitored_fields() {
        assert!(Forecast::knows_field("temperature_2m"));
        assert!(Forecast::knows_field("dew_point_2m"));
        assert!(!Forecast::knows_field("weather_code"));
    }
}
