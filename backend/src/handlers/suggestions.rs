//! HTTP handlers for alarm suggestion queries

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use shared::AlarmSuggestion;

use crate::error::AppResult;
use crate::AppState;

/// Query parameters for alarm suggestions
#[derive(Debug, Deserialize)]
pub struct SuggestionsQuery {
    pub location: String,
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct SuggestionsResponse {
    pub location: String,
    pub count: usize,
    pub suggestions: Vec<AlarmSuggestion>,
}

/// List alarm suggestions for a location, most confident first
/// (default limit 50)
pub async fn list_suggestions(
    State(state): State<AppState>,
    Query(query): Query<SuggestionsQuery>,
) -> AppResult<Json<SuggestionsResponse>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 1000);
    let suggestions = state.store.get_suggestions(&query.location, limit).await?;

    Ok(Json(SuggestionsResponse {
        location: query.location,
        count: suggestions.len(),
        suggestions,
    }))
}
