//! Route definitions for the read-only query surface

use axum::{routing::get, Router};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Location queries
        .route("/locations", get(handlers::list_locations))
        .route("/locations/:name", get(handlers::get_location))
        // Time-series queries
        .route("/observations", get(handlers::list_observations))
        .route("/anomalies", get(handlers::list_anomalies))
        .route("/suggestions", get(handlers::list_suggestions))
}
