//! HTTP handlers for observation queries

use axum::extract::{Query, State};
use axum::Json;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use shared::Observation;

use crate::error::AppResult;
use crate::AppState;

/// Query parameters for observations
#[derive(Debug, Deserialize)]
pub struct ObservationsQuery {
    pub location: String,
    /// Optional single metric type; omitted means every monitored field
    #[serde(rename = "type")]
    pub metric_type: Option<String>,
    /// Lookback window in hours
    pub hours: Option<i64>,
}

#[derive(Serialize)]
pub struct ObservationsResponse {
    pub location: String,
    pub hours: i64,
    pub count: usize,
    pub data: Vec<Observation>,
}

/// List observations for a location over a lookback window (default 24 h)
pub async fn list_observations(
    State(state): State<AppState>,
    Query(query): Query<ObservationsQuery>,
) -> AppResult<Json<ObservationsResponse>> {
    let hours = query.hours.unwrap_or(24).max(1);
    let since = Utc::now() - Duration::hours(hours);

    let metric_types: Vec<String> = match query.metric_type {
        Some(metric_type) => vec![metric_type],
        None => state.config.weather.monitored_fields.clone(),
    };

    let data = state
        .store
        .get_observations(&query.location, &metric_types, since)
        .await?;

    Ok(Json(ObservationsResponse {
        location: query.location,
        hours,
        count: data.len(),
        data,
    }))
}
