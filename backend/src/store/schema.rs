//! Database schema bootstrap.
//!
//! Idempotent `CREATE TABLE IF NOT EXISTS` statements applied once at
//! startup from `Store::connect`. The detector's hot-path indexes live
//! here too: `(location, metric_type, timestamp)` on observations and
//! `(location, timestamp)` on anomalies.

use sqlx::PgPool;

use crate::error::AppResult;

pub(super) async fn ensure_schema(pool: &PgPool) -> AppResult<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS locations (
            id        BIGSERIAL PRIMARY KEY,
            name      VARCHAR(255) NOT NULL UNIQUE,
            latitude  DOUBLE PRECISION NOT NULL,
            longitude DOUBLE PRECISION NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS observations (
            id          BIGSERIAL PRIMARY KEY,
            location    VARCHAR(255) NOT NULL DEFAULT '',
            timestamp   TIMESTAMPTZ(6) NOT NULL,
            metric_type VARCHAR(100) NOT NULL,
            value       DOUBLE PRECISION NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS anomalies (
            id          BIGSERIAL PRIMARY KEY,
            location    VARCHAR(255) NOT NULL DEFAULT '',
            timestamp   TIMESTAMPTZ(6) NOT NULL,
            metric_type VARCHAR(100) NOT NULL,
            value       DOUBLE PRECISION NOT NULL,
            score       DOUBLE PRECISION NOT NULL,
            severity    VARCHAR(50) NOT NULL,
            source      VARCHAR(10) NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS alarm_suggestions (
            id            BIGSERIAL PRIMARY KEY,
            location      VARCHAR(255) NOT NULL DEFAULT '',
            metric_type   VARCHAR(100) NOT NULL,
            threshold     DOUBLE PRECISION NOT NULL,
            operator      VARCHAR(10) NOT NULL,
            suggested_at  TIMESTAMPTZ(6) NOT NULL,
            confidence    DOUBLE PRECISION NOT NULL,
            description   TEXT NOT NULL,
            anomaly_count BIGINT NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_observations_location_type_time
            ON observations (location, metric_type, timestamp);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_anomalies_location_time
            ON anomalies (location, timestamp);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Natural key that makes re-running the detector over an overlapping
    // recent window idempotent.
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_anomalies_natural_key
            ON anomalies (location, timestamp, metric_type, source);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_alarm_suggestions_location
            ON alarm_suggestions (location);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
