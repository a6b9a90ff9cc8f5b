//! Read-only query server for the skywatch pipeline.
//!
//! Serves locations, observations, anomalies, and alarm suggestions over
//! HTTP; all writes happen in the pipeline binaries.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use skywatch_server::{init_tracing, routes, store::Store, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    dotenvy::dotenv().ok();
    let config = Config::load()?;

    tracing::info!("Starting skywatch query server");
    tracing::info!("Environment: {}", config.environment);

    tracing::info!("Connecting to database...");
    let store = Store::connect(&config.database).await?;
    tracing::info!("Database connection established");

    let port = config.server.port;
    let state = AppState {
        store,
        config: Arc::new(config),
    };

    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes and middleware
fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .nest("/api/v1", routes::api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "skywatch weather anomaly pipeline API v1.0"
}
