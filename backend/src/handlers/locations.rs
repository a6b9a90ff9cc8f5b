//! HTTP handlers for location queries

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use shared::Location;

use crate::error::AppResult;
use crate::AppState;

#[derive(Serialize)]
pub struct LocationsResponse {
    pub count: usize,
    pub locations: Vec<Location>,
}

/// List every known location, ordered by name
pub async fn list_locations(State(state): State<AppState>) -> AppResult<Json<LocationsResponse>> {
    let locations = state.store.list_locations().await?;
    Ok(Json(LocationsResponse {
        count: locations.len(),
        locations,
    }))
}

/// Fetch one location by name
pub async fn get_location(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<Json<Location>> {
    let location = state.store.get_location(&name).await?;
    Ok(Json(location))
}
