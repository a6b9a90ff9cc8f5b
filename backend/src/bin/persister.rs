//! Stream persister daemon.
//!
//! Joins the ingest consumer group and writes envelopes into the store
//! at-least-once until the process receives a termination signal.

use std::sync::Arc;

use skywatch_server::{
    init_tracing, persister::Persister, shutdown, store::Store, stream::StreamBus, Config,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    dotenvy::dotenv().ok();
    let config = Arc::new(Config::load()?);

    tracing::info!("Starting skywatch persister");

    let store = Store::connect(&config.database).await?;
    let bus = StreamBus::connect(&config.redis).await?;

    let (signal, shutdown_rx) = shutdown::channel();
    shutdown::listen_for_signals(signal);

    let persister = Persister::new(store, bus, config);
    persister.run(shutdown_rx).await?;

    Ok(())
}
