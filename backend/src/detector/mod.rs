//! Hybrid detector: a worker pool runs per-location detection, combining
//! an in-process statistical pass with a request/response ML pass, then
//! feeds anomalies and derived alarm suggestions back to the store.
//!
//! One invocation per run; the scheduler lives outside.

pub mod ml;
pub mod stats;
pub mod suggester;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::Instant;

use shared::{AlarmSuggestion, Anomaly, Location};

use crate::config::Config;
use crate::error::AppResult;
use crate::shutdown::Shutdown;
use crate::store::Store;
use crate::stream::StreamBus;

/// Outcome of detection for one location
#[derive(Debug)]
pub struct DetectionResult {
    pub location: String,
    pub anomalies: Vec<Anomaly>,
    pub suggestions: Vec<AlarmSuggestion>,
    pub error: Option<String>,
    pub elapsed: Duration,
}

/// Aggregate summary of one detection run
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DetectionSummary {
    pub processed: usize,
    pub errored: usize,
    pub anomalies: usize,
    pub suggestions: usize,
    pub avg_latency: Duration,
    pub workers: usize,
}

/// Hybrid detector over the full location set
pub struct Detector {
    store: Store,
    bus: StreamBus,
    config: Arc<Config>,
}

impl Detector {
    pub fn new(store: Store, bus: StreamBus, config: Arc<Config>) -> Self {
        Self { store, bus, config }
    }

    /// Run detection for every known location through the worker pool.
    ///
    /// Results are applied as they arrive, so store writes overlap with
    /// the remaining detections. A failure for one location is recorded
    /// and never reduces what sibling locations write.
    pub async fn run(&self, shutdown: Shutdown) -> AppResult<DetectionSummary> {
        let locations = self.store.list_locations().await?;
        if locations.is_empty() {
            tracing::info!("no locations to detect on");
            return Ok(DetectionSummary::default());
        }

        let workers = self.config.detector.workers.max(1).min(locations.len());
        tracing::info!(
            locations = locations.len(),
            workers,
            "starting detection run"
        );

        let (job_tx, job_rx) = mpsc::channel::<Location>(workers);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, mut result_rx) = mpsc::channel::<DetectionResult>(workers);

        let mut pool = JoinSet::new();
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let store = self.store.clone();
            let bus = self.bus.clone();
            let config = self.config.clone();
            let mut shutdown = shutdown.clone();

            pool.spawn(async move {
                loop {
                    let job = { job_rx.lock().await.recv().await };
                    let Some(location) = job else { break };

                    if shutdown.is_cancelled() {
                        break;
                    }

                    let result =
                        detect_location(&store, &bus, &config, &location, &mut shutdown).await;
                    if result_tx.send(result).await.is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);

        // Producer: queue every location, then close the jobs channel so
        // workers drain and exit.
        let producer = tokio::spawn(async move {
            for location in locations {
                if job_tx.send(location).await.is_err() {
                    break;
                }
            }
        });

        let mut summary = DetectionSummary {
            workers,
            ..Default::default()
        };
        let mut total_elapsed = Duration::ZERO;

        while let Some(result) = result_rx.recv().await {
            total_elapsed += result.elapsed;
            self.apply_result(result, &mut summary).await;
        }

        let _ = producer.await;
        while pool.join_next().await.is_some() {}

        let completed = summary.processed + summary.errored;
        if completed > 0 {
            summary.avg_latency = total_elapsed / completed as u32;
        }

        tracing::info!(
            processed = summary.processed,
            errored = summary.errored,
            anomalies = summary.anomalies,
            suggestions = summary.suggestions,
            avg_latency_ms = summary.avg_latency.as_millis() as u64,
            workers = summary.workers,
            "detection run complete"
        );
        Ok(summary)
    }

    async fn apply_result(&self, result: DetectionResult, summary: &mut DetectionSummary) {
        if let Some(error) = result.error {
            tracing::error!(location = %result.location, error = %error, "detection failed");
            summary.errored += 1;
            return;
        }

        if let Err(e) = self.insert_anomalies_with_retry(&result.anomalies).await {
            tracing::error!(location = %result.location, error = %e, "failed to store anomalies");
            summary.errored += 1;
            return;
        }

        summary.processed += 1;
        summary.anomalies += result.anomalies.len();

        if !result.anomalies.is_empty() {
            tracing::info!(
                location = %result.location,
                anomalies = result.anomalies.len(),
                elapsed_ms = result.elapsed.as_millis() as u64,
                "stored anomalies"
            );
        }

        // Suggestions are inserted independently; one failure does not
        // roll back the rest.
        for suggestion in &result.suggestions {
            match self.store.insert_suggestion(suggestion).await {
                Ok(()) => {
                    summary.suggestions += 1;
                    tracing::info!(
                        location = %suggestion.location,
                        metric_type = %suggestion.metric_type,
                        threshold = suggestion.threshold,
                        confidence = suggestion.confidence,
                        "stored alarm suggestion"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        location = %suggestion.location,
                        metric_type = %suggestion.metric_type,
                        error = %e,
                        "failed to store alarm suggestion"
                    );
                }
            }
        }
    }

    async fn insert_anomalies_with_retry(&self, anomalies: &[Anomaly]) -> AppResult<()> {
        match self.store.insert_anomalies(anomalies).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_transient_storage() => {
                tracing::warn!(error = %e, "transient failure storing anomalies, retrying once");
                self.store.insert_anomalies(anomalies).await
            }
            Err(e) => Err(e),
        }
    }
}

/// Detect anomalies for one location: statistical pass first, then the ML
/// pass, sets concatenated, suggestions derived from the combined list.
async fn detect_location(
    store: &Store,
    bus: &StreamBus,
    config: &Config,
    location: &Location,
    shutdown: &mut Shutdown,
) -> DetectionResult {
    let started = Instant::now();
    tracing::debug!(location = %location.name, "detecting anomalies");

    let mut anomalies = match stats::stat_anomalies(
        store,
        &config.detector,
        &config.weather.monitored_fields,
        &location.name,
    )
    .await
    {
        Ok(anomalies) => anomalies,
        Err(e) => return DetectionResult::failed(&location.name, e, started.elapsed()),
    };

    match ml::ml_anomalies(store, bus, config, &location.name, shutdown).await {
        Ok(ml_anomalies) => anomalies.extend(ml_anomalies),
        Err(e) => return DetectionResult::failed(&location.name, e, started.elapsed()),
    }

    let suggestions = suggester::suggest_alarms(
        &anomalies,
        &location.name,
        config.detector.min_anomalies_for_suggestion,
    );

    DetectionResult {
        location: location.name.clone(),
        anomalies,
        suggestions,
        error: None,
        elapsed: started.elapsed(),
    }
}

impl DetectionResult {
    fn failed(location: &str, error: crate::error::AppError, elapsed: Duration) -> Self {
        Self {
            location: location.to_string(),
            anomalies: Vec::new(),
            suggestions: Vec::new(),
            error: Some(error.to_string()),
            elapsed,
        }
    }
}
