//! Store layer: typed persistence of locations, observations, anomalies,
//! and alarm suggestions on a bounded PostgreSQL pool.

mod schema;

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use shared::{AlarmSuggestion, Anomaly, Forecast, IngestMode, Observation};

use crate::config::DatabaseConfig;
use crate::error::{AppError, AppResult};

/// Hourly timestamps arrive without an offset and are interpreted as UTC.
const HOURLY_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Store handle; cheap to clone, shares one connection pool
#[derive(Clone)]
pub struct Store {
    db: PgPool,
}

#[derive(sqlx::FromRow)]
struct LocationRow {
    id: i64,
    name: String,
    latitude: f64,
    longitude: f64,
}

#[derive(sqlx::FromRow)]
struct ObservationRow {
    id: i64,
    location: String,
    timestamp: DateTime<Utc>,
    metric_type: String,
    value: f64,
}

#[derive(sqlx::FromRow)]
struct AnomalyRow {
    id: i64,
    location: String,
    timestamp: DateTime<Utc>,
    metric_type: String,
    value: f64,
    score: f64,
    severity: String,
    source: String,
}

#[derive(sqlx::FromRow)]
struct SuggestionRow {
    id: i64,
    location: String,
    metric_type: String,
    threshold: f64,
    operator: String,
    suggested_at: DateTime<Utc>,
    confidence: f64,
    description: String,
    anomaly_count: i64,
}

impl From<LocationRow> for shared::Location {
    fn from(row: LocationRow) -> Self {
        shared::Location {
            id: row.id,
            name: row.name,
            latitude: row.latitude,
            longitude: row.longitude,
        }
    }
}

impl From<ObservationRow> for Observation {
    fn from(row: ObservationRow) -> Self {
        Observation {
            id: row.id,
            location: row.location,
            timestamp: row.timestamp,
            metric_type: row.metric_type,
            value: row.value,
        }
    }
}

impl TryFrom<AnomalyRow> for Anomaly {
    type Error = AppError;

    fn try_from(row: AnomalyRow) -> Result<Self, Self::Error> {
        Ok(Anomaly {
            id: row.id,
            location: row.location,
            timestamp: row.timestamp,
            metric_type: row.metric_type,
            value: row.value,
            score: row.score,
            severity: row.severity.parse().map_err(AppError::Decode)?,
            source: row.source.parse().map_err(AppError::Decode)?,
        })
    }
}

impl TryFrom<SuggestionRow> for AlarmSuggestion {
    type Error = AppError;

    fn try_from(row: SuggestionRow) -> Result<Self, Self::Error> {
        Ok(AlarmSuggestion {
            id: row.id,
            location: row.location,
            metric_type: row.metric_type,
            threshold: row.threshold,
            operator: row.operator.parse().map_err(AppError::Decode)?,
            suggested_at: row.suggested_at,
            confidence: row.confidence,
            description: row.description,
            anomaly_count: row.anomaly_count,
        })
    }
}

impl Store {
    /// Connect a bounded pool and ensure the schema exists.
    pub async fn connect(config: &DatabaseConfig) -> AppResult<Self> {
        let db = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .max_lifetime(Duration::from_secs(300))
            .connect(&config.url)
            .await?;

        let store = Self { db };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Wrap an existing pool (for tests).
    pub fn with_pool(db: PgPool) -> Self {
        Self { db }
    }

    /// Create tables and indexes if they do not exist; safe on every startup.
    pub async fn ensure_schema(&self) -> AppResult<()> {
        schema::ensure_schema(&self.db).await
    }

    /// Insert a location; a name collision is reported as
    /// [`AppError::DuplicateLocation`] so callers can treat it as a
    /// benign skip.
    pub async fn insert_location(
        &self,
        name: &str,
        latitude: f64,
        longitude: f64,
    ) -> AppResult<()> {
        let result = sqlx::query(
            "INSERT INTO locations (name, latitude, longitude) VALUES ($1, $2, $3)",
        )
        .bind(name)
        .bind(latitude)
        .bind(longitude)
        .execute(&self.db)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("23505") => {
                Err(AppError::DuplicateLocation(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// All known locations, ordered by name.
    pub async fn list_locations(&self) -> AppResult<Vec<shared::Location>> {
        let rows = sqlx::query_as::<_, LocationRow>(
            "SELECT id, name, latitude, longitude FROM locations ORDER BY name",
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Look up a single location by name.
    pub async fn get_location(&self, name: &str) -> AppResult<shared::Location> {
        let row = sqlx::query_as::<_, LocationRow>(
            "SELECT id, name, latitude, longitude FROM locations WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Location {}", name)))?;

        Ok(row.into())
    }

    /// Names of every location that already has at least one observation.
    /// Drives the collector's bootstrap-vs-incremental decision.
    pub async fn locations_with_observations(&self) -> AppResult<HashSet<String>> {
        let names = sqlx::query_scalar::<_, String>("SELECT DISTINCT location FROM observations")
            .fetch_all(&self.db)
            .await?;

        Ok(names.into_iter().collect())
    }

    /// Store every monitored reading from a decoded forecast payload.
    ///
    /// `historical` walks the aligned hourly arrays; `current` emits one
    /// row per field at "now". Fields the payload cannot carry, misaligned
    /// series, and unparseable timestamps are logged and skipped rather
    /// than failing the batch.
    pub async fn insert_observations(
        &self,
        mode: IngestMode,
        location: &str,
        fields: &[String],
        forecast: &Forecast,
    ) -> AppResult<()> {
        match mode {
            IngestMode::Historical => self.insert_hourly(location, fields, forecast).await,
            IngestMode::Current => self.insert_current(location, fields, forecast).await,
        }
    }

    async fn insert_hourly(
        &self,
        location: &str,
        fields: &[String],
        forecast: &Forecast,
    ) -> AppResult<()> {
        if forecast.hourly.time.is_empty() {
            return Err(AppError::Decode("no hourly data in forecast".to_string()));
        }

        let rows = plan_hourly_rows(fields, forecast);

        let mut tx = self.db.begin().await?;
        for (timestamp, field, value) in &rows {
            sqlx::query(
                "INSERT INTO observations (location, timestamp, metric_type, value) VALUES ($1, $2, $3, $4)",
            )
            .bind(location)
            .bind(timestamp)
            .bind(field)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::debug!(location, rows = rows.len(), "stored hourly observations");
        Ok(())
    }

    async fn insert_current(
        &self,
        location: &str,
        fields: &[String],
        forecast: &Forecast,
    ) -> AppResult<()> {
        let rows = plan_current_rows(fields, forecast, Utc::now());

        for (timestamp, field, value) in &rows {
            sqlx::query(
                "INSERT INTO observations (location, timestamp, metric_type, value) VALUES ($1, $2, $3, $4)",
            )
            .bind(location)
            .bind(timestamp)
            .bind(field)
            .bind(value)
            .execute(&self.db)
            .await?;
        }

        tracing::debug!(location, rows = rows.len(), "stored current observations");
        Ok(())
    }

    /// Transactionally insert a batch of anomalies; an empty batch is a
    /// no-op. Rows that collide on the natural key
    /// `(location, timestamp, metric_type, source)` are skipped, so
    /// overlapping detection runs do not duplicate anomalies.
    pub async fn insert_anomalies(&self, anomalies: &[Anomaly]) -> AppResult<()> {
        if anomalies.is_empty() {
            return Ok(());
        }

        let mut tx = self.db.begin().await?;

        for anomaly in anomalies {
            sqlx::query(
                r#"
                INSERT INTO anomalies (location, timestamp, metric_type, value, score, severity, source)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (location, timestamp, metric_type, source) DO NOTHING
                "#,
            )
            .bind(&anomaly.location)
            .bind(anomaly.timestamp)
            .bind(&anomaly.metric_type)
            .bind(anomaly.value)
            .bind(anomaly.score)
            .bind(anomaly.severity.as_str())
            .bind(anomaly.source.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!(rows = anomalies.len(), "stored anomaly batch");
        Ok(())
    }

    /// Insert one alarm suggestion.
    pub async fn insert_suggestion(&self, suggestion: &AlarmSuggestion) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO alarm_suggestions
                (location, metric_type, threshold, operator, suggested_at, confidence, description, anomaly_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&suggestion.location)
        .bind(&suggestion.metric_type)
        .bind(suggestion.threshold)
        .bind(suggestion.operator.as_str())
        .bind(suggestion.suggested_at)
        .bind(suggestion.confidence)
        .bind(&suggestion.description)
        .bind(suggestion.anomaly_count)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Observations for a location since `since`, newest first.
    /// `metric_types` filters to one or many types; an empty slice returns
    /// every type.
    pub async fn get_observations(
        &self,
        location: &str,
        metric_types: &[String],
        since: DateTime<Utc>,
    ) -> AppResult<Vec<Observation>> {
        let rows = if metric_types.len() == 1 {
            sqlx::query_as::<_, ObservationRow>(
                r#"
                SELECT id, location, timestamp, metric_type, value
                FROM observations
                WHERE location = $1 AND metric_type = $2 AND timestamp >= $3
                ORDER BY timestamp DESC
                "#,
            )
            .bind(location)
            .bind(&metric_types[0])
            .bind(since)
            .fetch_all(&self.db)
            .await?
        } else if metric_types.is_empty() {
            sqlx::query_as::<_, ObservationRow>(
                r#"
                SELECT id, location, timestamp, metric_type, value
                FROM observations
                WHERE location = $1 AND timestamp >= $2
                ORDER BY timestamp DESC
                "#,
            )
            .bind(location)
            .bind(since)
            .fetch_all(&self.db)
            .await?
        } else {
            sqlx::query_as::<_, ObservationRow>(
                r#"
                SELECT id, location, timestamp, metric_type, value
                FROM observations
                WHERE location = $1 AND metric_type = ANY($2) AND timestamp >= $3
                ORDER BY timestamp DESC
                "#,
            )
            .bind(location)
            .bind(metric_types)
            .bind(since)
            .fetch_all(&self.db)
            .await?
        };

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Recent anomalies for a location, newest first.
    pub async fn get_anomalies(&self, location: &str, limit: i64) -> AppResult<Vec<Anomaly>> {
        let rows = sqlx::query_as::<_, AnomalyRow>(
            r#"
            SELECT id, location, timestamp, metric_type, value, score, severity, source
            FROM anomalies
            WHERE location = $1
            ORDER BY timestamp DESC
            LIMIT $2
            "#,
        )
        .bind(location)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Alarm suggestions for a location, most confident first.
    pub async fn get_suggestions(
        &self,
        location: &str,
        limit: i64,
    ) -> AppResult<Vec<AlarmSuggestion>> {
        let rows = sqlx::query_as::<_, SuggestionRow>(
            r#"
            SELECT id, location, metric_type, threshold, operator, suggested_at,
                   confidence, description, anomaly_count
            FROM alarm_suggestions
            WHERE location = $1
            ORDER BY confidence DESC, suggested_at DESC
            LIMIT $2
            "#,
        )
        .bind(location)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

/// Plan the rows a historical envelope produces: one per timestamp per
/// requested field. Fields the payload cannot carry, misaligned series,
/// and unparseable timestamps are logged and skipped, never fatal.
fn plan_hourly_rows(
    fields: &[String],
    forecast: &Forecast,
) -> Vec<(DateTime<Utc>, String, f64)> {
    let timestamps = &forecast.hourly.time;
    let mut rows = Vec::new();

    for field in fields {
        let Some(values) = forecast.hourly_series(field) else {
            tracing::warn!(%field, "field not found in hourly data");
            continue;
        };

        if values.is_empty() {
            tracing::warn!(%field, "skipping field with no hourly data");
            continue;
        }

        if values.len() != timestamps.len() {
            tracing::warn!(
                %field,
                values = values.len(),
                timestamps = timestamps.len(),
                "misaligned hourly series, skipping field"
            );
            continue;
        }

        for (raw_ts, value) in timestamps.iter().zip(values) {
            match NaiveDateTime::parse_from_str(raw_ts, HOURLY_TIME_FORMAT) {
                Ok(naive) => rows.push((naive.and_utc(), field.clone(), *value)),
                Err(e) => {
                    tracing::warn!(timestamp = %raw_ts, error = %e, "failed to parse hourly timestamp");
                }
            }
        }
    }

    rows
}

/// Plan the rows a current envelope produces: one per field at `now`,
/// skipping unknown fields and absent values.
fn plan_current_rows(
    fields: &[String],
    forecast: &Forecast,
    now: DateTime<Utc>,
) -> Vec<(DateTime<Utc>, String, f64)> {
    let mut rows = Vec::new();

    for field in fields {
        if !Forecast::knows_field(field) {
            tracing::warn!(%field, "field not found in current data");
            continue;
        }

        let Some(value) = forecast.current_value(field) else {
            tracing::debug!(%field, "skipping field with no current value");
            continue;
        };

        rows.push((now, field.clone(), value));
    }

    rows
}
