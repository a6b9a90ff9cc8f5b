//! skywatch — weather anomaly pipeline
//!
//! Ingests time-series weather observations for a fleet of locations,
//! persists them through a durable stream, and scans recent history with a
//! hybrid statistical + ML detector that proposes alarm thresholds from
//! repeated anomalies. Each pipeline stage is its own binary (seed,
//! collector, persister, detector, server) over this shared library.

use std::sync::Arc;

pub mod collector;
pub mod config;
pub mod detector;
pub mod error;
pub mod external;
pub mod handlers;
pub mod persister;
pub mod routes;
pub mod shutdown;
pub mod store;
pub mod stream;

pub use config::Config;

/// Application state shared across query-server handlers
#[derive(Clone)]
pub struct AppState {
    pub store: store::Store,
    pub config: Arc<Config>,
}

/// Initialize the global tracing subscriber for structured logging.
///
/// Called once at startup by every binary before any logging macros run.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "skywatch_server=debug,tower_http=debug,sqlx=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
