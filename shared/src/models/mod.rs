//! Domain rows persisted by the store layer

mod forecast;
mod stream;

pub use forecast::*;
pub use stream::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AnomalySource, Operator, Severity};

/// A monitored geographic location.
///
/// Created once by bulk import; `name` is globally unique and is the key
/// every other row refers to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Location {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// A single stored weather reading
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    #[serde(default)]
    pub id: i64,
    pub location: String,
    pub timestamp: DateTime<Utc>,
    pub metric_type: String,
    pub value: f64,
}

/// A detected anomaly.
///
/// `score` is a z-score when `source` is `stat` and the ML worker's
/// anomaly score when `source` is `ml`; larger magnitude means more
/// anomalous in both cases.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Anomaly {
    #[serde(default)]
    pub id: i64,
    pub location: String,
    pub timestamp: DateTime<Utc>,
    pub metric_type: String,
    pub value: f64,
    pub score: f64,
    pub severity: Severity,
    pub source: AnomalySource,
}

/// A suggested alarm rule derived from a cluster of anomalies
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlarmSuggestion {
    #[serde(default)]
    pub id: i64,
    pub location: String,
    pub metric_type: String,
    pub threshold: f64,
    pub operator: Operator,
    pub suggested_at: DateTime<Utc>,
    pub confidence: f64,
    pub description: String,
    pub anomaly_count: i64,
}
