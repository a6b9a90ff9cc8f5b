//! Durable consumer that drains the ingest stream into the store.
//!
//! Joins a fixed consumer group, replays its own pending entries on
//! startup, and then reads undelivered envelopes in small blocking
//! batches. Acknowledgement only follows a successful store write, so a
//! crashed or failed write is redelivered; undecodable envelopes are
//! poison and get acknowledged away.

use std::sync::Arc;

use shared::IngestEnvelope;

use crate::config::Config;
use crate::error::AppResult;
use crate::shutdown::Shutdown;
use crate::store::Store;
use crate::stream::{StreamBus, StreamMessage};

/// Entries pulled per read cycle
const READ_COUNT: usize = 10;
/// How long one empty read blocks before re-checking for shutdown
const READ_BLOCK_MS: usize = 5_000;

/// Durable ingest-stream consumer
pub struct Persister {
    store: Store,
    bus: StreamBus,
    config: Arc<Config>,
    consumer: String,
}

impl Persister {
    pub fn new(store: Store, bus: StreamBus, config: Arc<Config>) -> Self {
        // A stable consumer name keeps pending entries addressable across
        // restarts; replicas must configure distinct names.
        let consumer = config.redis.ingest_consumer.clone();
        Self {
            store,
            bus,
            config,
            consumer,
        }
    }

    /// Consume until cancelled.
    pub async fn run(&self, mut shutdown: Shutdown) -> AppResult<()> {
        let stream = &self.config.redis.ingest_stream;
        let group = &self.config.redis.ingest_group;

        self.bus.ensure_group(stream, group).await?;
        tracing::info!(%stream, %group, consumer = %self.consumer, "persister started");

        // Start by replaying entries this consumer read but never
        // acknowledged (crashed or failed writes from a previous cycle).
        let mut start = "0".to_string();

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let read = tokio::select! {
                read = self.bus.read_group(
                    stream,
                    group,
                    &self.consumer,
                    &start,
                    READ_COUNT,
                    READ_BLOCK_MS,
                ) => read,
                _ = shutdown.cancelled() => break,
            };

            let messages = match read {
                Ok(messages) => messages,
                Err(e) => {
                    tracing::error!(error = %e, "error reading from ingest stream");
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                    continue;
                }
            };

            if messages.is_empty() {
                // Pending backlog drained; read undelivered entries.
                start = ">".to_string();
                continue;
            }

            let total = messages.len();
            let mut acked = 0usize;
            for message in messages {
                if shutdown.is_cancelled() {
                    tracing::info!("persister stopping mid-batch");
                    return Ok(());
                }
                if self.handle_message(message).await {
                    acked += 1;
                }
            }

            if acked < total {
                // Unacked entries stay pending; replay them on the next
                // cycle instead of leaving them until a restart.
                if acked == 0 {
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                }
                start = "0".to_string();
            }
        }

        tracing::info!("persister stopped");
        Ok(())
    }

    /// Process one entry; returns whether it was acknowledged.
    async fn handle_message(&self, message: StreamMessage) -> bool {
        let stream = &self.config.redis.ingest_stream;

        let Some(data) = message.data.as_deref() else {
            tracing::warn!(id = %message.id, "message has no data field, discarding");
            self.ack_quietly(&message.id).await;
            return true;
        };

        let envelope: IngestEnvelope = match serde_json::from_str(data) {
            Ok(envelope) => envelope,
            Err(e) => {
                // Poison message: it will never decode, so ack it away.
                tracing::warn!(id = %message.id, error = %e, "failed to decode envelope, discarding");
                self.ack_quietly(&message.id).await;
                return true;
            }
        };

        let stored = self
            .store
            .insert_observations(
                envelope.mode,
                &envelope.location.name,
                &envelope.fields,
                &envelope.forecast,
            )
            .await;

        match stored {
            Ok(()) => {
                tracing::info!(
                    id = %message.id,
                    location = %envelope.location.name,
                    mode = %envelope.mode,
                    lat = envelope.location.latitude,
                    lon = envelope.location.longitude,
                    "stored envelope"
                );
                self.ack_quietly(&message.id).await;
                self.bus.trim(stream, self.config.redis.ingest_maxlen).await;
                true
            }
            Err(e) => {
                // No ack: the entry stays pending and is redelivered.
                tracing::error!(
                    id = %message.id,
                    location = %envelope.location.name,
                    error = %e,
                    "failed to store envelope, leaving pending"
                );
                false
            }
        }
    }

    async fn ack_quietly(&self, id: &str) {
        let stream = &self.config.redis.ingest_stream;
        let group = &self.config.redis.ingest_group;
        if let Err(e) = self.bus.ack(stream, group, id).await {
            tracing::warn!(id, error = %e, "failed to acknowledge message");
        }
    }
}
