//! One-shot hybrid detector.
//!
//! Runs statistical and ML detection for every known location through a
//! worker pool, stores anomalies and derived alarm suggestions, logs a
//! run summary, and exits. Scheduling is external.

use std::sync::Arc;

use skywatch_server::{
    detector::Detector, init_tracing, shutdown, store::Store, stream::StreamBus, Config,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    dotenvy::dotenv().ok();
    let config = Arc::new(Config::load()?);

    tracing::info!("Starting skywatch detector");

    let store = Store::connect(&config.database).await?;
    let bus = StreamBus::connect(&config.redis).await?;

    let (signal, shutdown_rx) = shutdown::channel();
    shutdown::listen_for_signals(signal);

    let detector = Detector::new(store, bus, config);
    let summary = detector.run(shutdown_rx).await?;

    tracing::info!(
        processed = summary.processed,
        errored = summary.errored,
        anomalies = summary.anomalies,
        suggestions = summary.suggestions,
        "detector finished"
    );
    Ok(())
}
