//! Common enums used across the pipeline

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Bucketed anomaly severity derived from score magnitude
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// Which detector produced an anomaly score.
///
/// A statistical z-score and an ML anomaly score are not comparable, so the
/// producer is recorded next to the score instead of being merged away.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnomalySource {
    Stat,
    Ml,
}

impl AnomalySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalySource::Stat => "stat",
            AnomalySource::Ml => "ml",
        }
    }
}

impl fmt::Display for AnomalySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnomalySource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stat" => Ok(AnomalySource::Stat),
            "ml" => Ok(AnomalySource::Ml),
            other => Err(format!("unknown anomaly source: {other}")),
        }
    }
}

/// Comparison operator for a suggested alarm threshold
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Operator {
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = "<")]
    LessThan,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::GreaterThan => ">",
            Operator::LessThan => "<",
        }
    }

    /// Whether `value` would trigger an alarm with this operator and threshold.
    pub fn triggers(&self, value: f64, threshold: f64) -> bool {
        match self {
            Operator::GreaterThan => value > threshold,
            Operator::LessThan => value < threshold,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ">" => Ok(Operator::GreaterThan),
            "<" => Ok(Operator::LessThan),
            other => Err(format!("unknown operator: {other}")),
        }
    }
}

/// Whether an ingest envelope carries a multi-day hourly backfill or a
/// single current-conditions sample
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IngestMode {
    Historical,
    Current,
}

impl IngestMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestMode::Historical => "historical",
            IngestMode::Current => "current",
        }
    }
}

impl fmt::Display for IngestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_round_trips_through_str() {
        for s in [Severity::Low, Severity::Medium, Severity::High] {
            assert_eq!(s.as_str().parse::<Severity>().unwrap(), s);
        }
        assert!("critical".parse::<Severity>().is_err());
    }

    #[test]
    fn operator_triggers() {
        assert!(Operator::GreaterThan.triggers(40.0, 38.0));
        assert!(!Operator::GreaterThan.triggers(38.0, 38.0));
        assert!(Operator::LessThan.triggers(-10.0, -5.0));
        assert!(!Operator::LessThan.triggers(-5.0, -5.0));
    }

    #[test]
    fn ingest_mode_labels() {
        assert_eq!(IngestMode::Historical.as_str(), "historical");
        assert_eq!(IngestMode::Current.as_str(), "current");
    }

    #[test]
    fn enums_serialize_to_wire_labels() {
        assert_eq!(
            serde_json::to_string(&Operator::GreaterThan).unwrap(),
            r#"">""#
        );
        assert_eq!(serde_json::to_string(&Severity::High).unwrap(), r#""high""#);
        assert_eq!(
            serde_json::to_string(&AnomalySource::Ml).unwrap(),
            r#""ml""#
        );
        assert_eq!(
            serde_json::from_str::<Operator>(r#""<""#).unwrap(),
            Operator::LessThan
        );
    }
}
