//! HTTP handlers for anomaly queries

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use shared::Anomaly;

use crate::error::AppResult;
use crate::AppState;

/// Query parameters for anomalies
#[derive(Debug, Deserialize)]
pub struct AnomaliesQuery {
    pub location: String,
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct AnomaliesResponse {
    pub location: String,
    pub count: usize,
    pub anomalies: Vec<Anomaly>,
}

/// List recent anomalies for a location, newest first (default limit 100)
pub async fn list_anomalies(
    State(state): State<AppState>,
    Query(query): Query<AnomaliesQuery>,
) -> AppResult<Json<AnomaliesResponse>> {
    let limit = query.limit.unwrap_or(100).clamp(1, 1000);
    let anomalies = state.store.get_anomalies(&query.location, limit).await?;

    Ok(Json(AnomaliesResponse {
        location: query.location,
        count: anomalies.len(),
        anomalies,
    }))
}
