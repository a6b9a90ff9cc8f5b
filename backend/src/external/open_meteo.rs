//! Open-Meteo API client for fetching weather data
//!
//! Projects the configured field set onto a single forecast endpoint and
//! returns either a `current` point sample or an `hourly` archive batch.
//! Retry policy lives in the collector, not here.

use reqwest::{Client, StatusCode};
use shared::Forecast;

use crate::config::WeatherConfig;
use crate::error::{AppError, AppResult};

/// Parameters for one forecast request
#[derive(Debug, Clone, Default)]
pub struct ForecastParams {
    pub latitude: f64,
    pub longitude: f64,
    pub current_fields: Vec<String>,
    pub hourly_fields: Vec<String>,
    /// How many days of history to include in the hourly block
    pub past_days: u32,
    /// How many days ahead to forecast; 0 restricts hourly data to the past
    pub forecast_days: Option<u32>,
}

/// Open-Meteo API client
#[derive(Clone)]
pub struct OpenMeteoClient {
    client: Client,
    base_url: String,
    timezone: String,
    temperature_unit: String,
}

impl OpenMeteoClient {
    /// Create a client from the weather configuration section
    pub fn new(config: &WeatherConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            base_url: config.base_url.clone(),
            timezone: config.timezone.clone(),
            temperature_unit: config.temperature_unit.clone(),
        }
    }

    /// Create a client with a custom base URL (for testing)
    pub fn with_base_url(config: &WeatherConfig, base_url: String) -> Self {
        let mut client = Self::new(config);
        client.base_url = base_url;
        client
    }

    /// Fetch current conditions for the given coordinates, projected onto
    /// `fields`.
    pub async fn fetch_current(
        &self,
        latitude: f64,
        longitude: f64,
        fields: &[String],
    ) -> AppResult<Forecast> {
        if fields.is_empty() {
            return Err(AppError::Validation {
                field: "fields".to_string(),
                message: "no weather fields provided".to_string(),
            });
        }

        self.fetch(ForecastParams {
            latitude,
            longitude,
            current_fields: fields.to_vec(),
            ..Default::default()
        })
        .await
    }

    /// Fetch the hourly archive for the past `past_days` days, projected
    /// onto `fields`.
    pub async fn fetch_historical_hourly(
        &self,
        latitude: f64,
        longitude: f64,
        fields: &[String],
        past_days: u32,
    ) -> AppResult<Forecast> {
        if fields.is_empty() {
            return Err(AppError::Validation {
                field: "fields".to_string(),
                message: "no weather fields provided".to_string(),
            });
        }

        self.fetch(ForecastParams {
            latitude,
            longitude,
            hourly_fields: fields.to_vec(),
            past_days,
            forecast_days: Some(0),
            ..Default::default()
        })
        .await
    }

    async fn fetch(&self, params: ForecastParams) -> AppResult<Forecast> {
        let url = self.build_url(&params);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::WeatherApi(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(AppError::RateLimited(format!(
                    "status {}, body: {}",
                    status, body
                )));
            }
            return Err(AppError::WeatherApi(format!(
                "status {}, body: {}",
                status, body
            )));
        }

        response
            .json::<Forecast>()
            .await
            .map_err(|e| AppError::Decode(format!("failed to decode forecast: {}", e)))
    }

    /// Build the request URL for the given projection.
    pub fn build_url(&self, params: &ForecastParams) -> String {
        let mut url = format!(
            "{}?latitude={:.4}&longitude={:.4}&timezone={}&temperature_unit={}",
            self.base_url, params.latitude, params.longitude, self.timezone, self.temperature_unit
        );

        if params.past_days > 0 {
            url.push_str(&format!("&past_days={}", params.past_days));
        }

        if let Some(days) = params.forecast_days {
            url.push_str(&format!("&forecast_days={}", days));
        }

        if !params.current_fields.is_empty() {
            url.push_str("&current=");
            url.push_str(&params.current_fields.join(","));
        }

        if !params.hourly_fields.is_empty() {
            url.push_str("&hourly=");
            url.push_str(&params.hourly_fields.join(","));
        }

        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> WeatherConfig {
        WeatherConfig {
            base_url: "https://api.open-meteo.com/v1/forecast".to_string(),
            timezone: "UTC".to_string(),
            temperature_unit: "celsius".to_string(),
            monitored_fields: vec!["temperature_2m".to_string(), "precipitation".to_string()],
        }
    }

    #[test]
    fn build_url_current_projection() {
        let client = OpenMeteoClient::new(&test_config());
        let url = client.build_url(&ForecastParams {
            latitude: 35.6762,
            longitude: 139.6503,
            current_fields: vec!["temperature_2m".into(), "precipitation".into()],
            ..Default::default()
        });

        assert!(url.starts_with("https://api.open-meteo.com/v1/forecast?latitude=35.6762"));
        assert!(url.contains("longitude=139.6503"));
        assert!(url.contains("timezone=UTC"));
        assert!(url.contains("temperature_unit=celsius"));
        assert!(url.contains("&current=temperature_2m,precipitation"));
        assert!(!url.contains("&hourly="));
        assert!(!url.contains("past_days"));
    }

    #[test]
    fn build_url_historical_projection() {
        let client = OpenMeteoClient::new(&test_config());
        let url = client.build_url(&ForecastParams {
            latitude: 39.7392,
            longitude: -104.9903,
            hourly_fields: vec!["temperature_2m".into()],
            past_days: 7,
            forecast_days: Some(0),
            ..Default::default()
        });

        assert!(url.contains("latitude=39.7392"));
        assert!(url.contains("longitude=-104.9903"));
        assert!(url.contains("&past_days=7"));
        assert!(url.contains("&forecast_days=0"));
        assert!(url.contains("&hourly=temperature_2m"));
        assert!(!url.contains("&current="));
    }

    #[tokio::test]
    async fn empty_field_list_is_a_validation_error() {
        let client = OpenMeteoClient::new(&test_config());
        let err = client.fetch_current(0.0, 0.0, &[]).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }
}
