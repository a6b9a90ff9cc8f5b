//! Fan-out ingestor: one task per location, bounded outbound concurrency,
//! bootstrap-vs-incremental mode decision, and rate-limit retry with
//! exponential backoff. One-shot; an external scheduler drives it.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use shared::{Forecast, IngestEnvelope, IngestMode, Location, LocationRef};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::external::OpenMeteoClient;
use crate::store::Store;
use crate::stream::StreamBus;

/// Outcome counts for one collector run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CollectorSummary {
    pub published: usize,
    pub failed: usize,
}

/// Fan-out ingestor over the full location set
pub struct Collector {
    store: Store,
    bus: StreamBus,
    client: OpenMeteoClient,
    config: Arc<Config>,
}

impl Collector {
    pub fn new(store: Store, bus: StreamBus, client: OpenMeteoClient, config: Arc<Config>) -> Self {
        Self {
            store,
            bus,
            client,
            config,
        }
    }

    /// Run one collection pass over every known location.
    pub async fn run(&self) -> AppResult<CollectorSummary> {
        let locations = self.store.list_locations().await?;
        let seeded = self.store.locations_with_observations().await?;

        tracing::info!(
            locations = locations.len(),
            with_history = seeded.len(),
            "starting collection run"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.collector.concurrency.max(1)));
        let seeded = Arc::new(seeded);
        let mut tasks = JoinSet::new();

        for location in locations {
            let store_seeded = seeded.clone();
            let semaphore = semaphore.clone();
            let bus = self.bus.clone();
            let client = self.client.clone();
            let config = self.config.clone();

            tasks.spawn(async move {
                collect_location(location, store_seeded, semaphore, bus, client, config).await
            });
        }

        let mut summary = CollectorSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => summary.published += 1,
                Ok(Err(())) => summary.failed += 1,
                Err(e) => {
                    tracing::error!(error = %e, "collector task panicked");
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            published = summary.published,
            failed = summary.failed,
            "collection run complete"
        );
        Ok(summary)
    }
}

/// Pick the ingest mode for one location at task start.
pub fn choose_mode(location: &str, seeded: &HashSet<String>) -> IngestMode {
    if seeded.contains(location) {
        IngestMode::Current
    } else {
        IngestMode::Historical
    }
}

/// Backoff before retry `attempt` (0-based): 1 s, 2 s, 4 s, ...
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.min(16))
}

async fn collect_location(
    location: Location,
    seeded: Arc<HashSet<String>>,
    semaphore: Arc<Semaphore>,
    bus: StreamBus,
    client: OpenMeteoClient,
    config: Arc<Config>,
) -> Result<(), ()> {
    let mode = choose_mode(&location.name, &seeded);
    tracing::info!(location = %location.name, mode = %mode, "fetching weather data");

    let forecast = match fetch_with_retry(&location, mode, &semaphore, &client, &config).await {
        Ok(forecast) => forecast,
        Err(e) => {
            tracing::error!(location = %location.name, error = %e, "failed to fetch forecast");
            return Err(());
        }
    };

    let envelope = IngestEnvelope {
        location: LocationRef {
            name: location.name.clone(),
            latitude: location.latitude,
            longitude: location.longitude,
        },
        forecast,
        fields: config.weather.monitored_fields.clone(),
        mode,
    };

    match bus
        .publish_json(&config.redis.ingest_stream, &envelope)
        .await
    {
        Ok(id) => {
            tracing::info!(location = %location.name, mode = %mode, stream_id = %id, "published ingest envelope");
            Ok(())
        }
        Err(e) => {
            tracing::error!(location = %location.name, error = %e, "failed to publish ingest envelope");
            Err(())
        }
    }
}

async fn fetch_with_retry(
    location: &Location,
    mode: IngestMode,
    semaphore: &Semaphore,
    client: &OpenMeteoClient,
    config: &Config,
) -> AppResult<Forecast> {
    let fields = &config.weather.monitored_fields;
    let max_attempts = config.collector.max_attempts.max(1);

    for attempt in 0..max_attempts {
        let result = {
            // Hold the permit only across the network call, never across
            // the backoff sleep.
            let _permit = semaphore
                .acquire()
                .await
                .map_err(|_| AppError::Cancelled)?;

            match mode {
                IngestMode::Historical => {
                    client
                        .fetch_historical_hourly(
                            location.latitude,
                            location.longitude,
                            fields,
                            config.collector.historical_days,
                        )
                        .await
                }
                IngestMode::Current => {
                    client
                        .fetch_current(location.latitude, location.longitude, fields)
                        .await
                }
            }
        };

        match result {
            Ok(forecast) => return Ok(forecast),
            Err(e) if e.is_rate_limited() && attempt + 1 < max_attempts => {
                let delay = backoff_delay(attempt);
                tracing::warn!(
                    location = %location.name,
                    attempt = attempt + 1,
                    delay_secs = delay.as_secs(),
                    "rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }

    unreachable!("retry loop returns on the final attempt")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_is_historical_only_without_prior_observations() {
        let mut seeded = HashSet::new();
        seeded.insert("Tokyo".to_string());

        assert_eq!(choose_mode("Tokyo", &seeded), IngestMode::Current);
        assert_eq!(choose_mode("Denver", &seeded), IngestMode::Historical);
        // Names are case-sensitive.
        assert_eq!(choose_mode("tokyo", &seeded), IngestMode::Historical);
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(backoff_delay(0), Duration::from_secs(1));
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn semaphore_caps_concurrent_holders() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let semaphore = Arc::new(Semaphore::new(2));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = JoinSet::new();
        for _ in 0..16 {
            let semaphore = semaphore.clone();
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire().await.unwrap();
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            });
        }
        while tasks.join_next().await.is_some() {}

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }
}
