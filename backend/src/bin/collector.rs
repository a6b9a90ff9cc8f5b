//! One-shot fan-out collector.
//!
//! Fetches weather data for every known location (7-day hourly backfill
//! for locations without history, a current sample otherwise) and
//! publishes ingest envelopes. Scheduling is external; the process exits
//! when every location task has finished.

use std::sync::Arc;

use skywatch_server::{
    collector::Collector, external::OpenMeteoClient, init_tracing, store::Store,
    stream::StreamBus, Config,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    dotenvy::dotenv().ok();
    let config = Arc::new(Config::load()?);

    tracing::info!("Starting skywatch collector");

    let store = Store::connect(&config.database).await?;
    let bus = StreamBus::connect(&config.redis).await?;
    let client = OpenMeteoClient::new(&config.weather);

    let collector = Collector::new(store, bus, client, config);
    let summary = collector.run().await?;

    tracing::info!(
        published = summary.published,
        failed = summary.failed,
        "collector finished"
    );
    Ok(())
}
