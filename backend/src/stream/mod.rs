//! Redis stream transport.
//!
//! Three logical streams ride on one connection: the ingest stream between
//! collector and persister (consumer-group delivery), and the ML
//! request/response pair the detector correlates by job id. Every payload
//! travels as one JSON document under a single `data` field.

use redis::aio::ConnectionManager;
use redis::streams::{StreamMaxlen, StreamRangeReply, StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use serde::Serialize;

use crate::config::RedisConfig;
use crate::error::{AppError, AppResult};

/// Id that sorts before every real stream entry
pub const STREAM_ORIGIN: &str = "0-0";

/// One entry read off a stream
#[derive(Debug, Clone)]
pub struct StreamMessage {
    pub id: String,
    pub data: Option<String>,
}

/// Handle to the stream transport; cheap to clone
#[derive(Clone)]
pub struct StreamBus {
    conn: ConnectionManager,
}

impl StreamBus {
    /// Connect to the stream service configured in `config`.
    pub async fn connect(config: &RedisConfig) -> AppResult<Self> {
        let client = redis::Client::open(config.url.as_str())?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    /// Serialize `payload` and append it to `stream`; returns the new id.
    pub async fn publish_json<T: Serialize>(&self, stream: &str, payload: &T) -> AppResult<String> {
        let data = serde_json::to_string(payload)
            .map_err(|e| AppError::Decode(format!("failed to serialize payload: {}", e)))?;

        let mut conn = self.conn.clone();
        let id: String = conn.xadd(stream, "*", &[("data", data.as_str())]).await?;
        Ok(id)
    }

    /// Create the consumer group if it does not exist; the "group already
    /// exists" race is benign.
    pub async fn ensure_group(&self, stream: &str, group: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let created: Result<String, redis::RedisError> =
            conn.xgroup_create_mkstream(stream, group, "0").await;

        match created {
            Ok(_) => Ok(()),
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Read up to `count` entries for `consumer` in `group`.
    ///
    /// `start` is `">"` for undelivered entries (blocking up to `block_ms`)
    /// or `"0"` to replay this consumer's pending entries after a restart.
    pub async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        start: &str,
        count: usize,
        block_ms: usize,
    ) -> AppResult<Vec<StreamMessage>> {
        let mut opts = StreamReadOptions::default()
            .group(group, consumer)
            .count(count);
        if block_ms > 0 {
            opts = opts.block(block_ms);
        }

        let mut conn = self.conn.clone();
        let reply: Option<StreamReadReply> =
            conn.xread_options(&[stream], &[start], &opts).await?;

        Ok(flatten(reply))
    }

    /// Read up to `count` entries with ids greater than `cursor`, without
    /// blocking. Used by the detector's ML response poll loop.
    pub async fn read_after(
        &self,
        stream: &str,
        cursor: &str,
        count: usize,
    ) -> AppResult<Vec<StreamMessage>> {
        let opts = StreamReadOptions::default().count(count);

        let mut conn = self.conn.clone();
        let reply: Option<StreamReadReply> =
            conn.xread_options(&[stream], &[cursor], &opts).await?;

        Ok(flatten(reply))
    }

    /// Greatest id currently in `stream`, or [`STREAM_ORIGIN`] when empty.
    pub async fn tail_id(&self, stream: &str) -> AppResult<String> {
        let mut conn = self.conn.clone();
        let reply: StreamRangeReply = conn.xrevrange_count(stream, "+", "-", 1).await?;

        Ok(reply
            .ids
            .first()
            .map(|entry| entry.id.clone())
            .unwrap_or_else(|| STREAM_ORIGIN.to_string()))
    }

    /// Acknowledge one entry for `group`.
    pub async fn ack(&self, stream: &str, group: &str, id: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.xack(stream, group, &[id]).await?;
        Ok(())
    }

    /// Trim `stream` to approximately `maxlen` entries. Best-effort
    /// housekeeping: failures are logged, never propagated.
    pub async fn trim(&self, stream: &str, maxlen: usize) {
        let mut conn = self.conn.clone();
        let trimmed: Result<i64, redis::RedisError> =
            conn.xtrim(stream, StreamMaxlen::Approx(maxlen)).await;

        if let Err(e) = trimmed {
            tracing::warn!(stream, error = %e, "stream trim failed");
        }
    }
}

fn flatten(reply: Option<StreamReadReply>) -> Vec<StreamMessage> {
    let Some(reply) = reply else {
        return Vec::new();
    };

    reply
        .keys
        .into_iter()
        .flat_map(|key| key.ids)
        .map(|entry| StreamMessage {
            data: entry.get::<String>("data"),
            id: entry.id,
        })
        .collect()
}
