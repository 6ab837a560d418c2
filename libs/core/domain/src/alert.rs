// [libs/core/domain/src/alert.rs]
//! Alert rules and alert records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Cpu,
    Mem,
    Disk,
    DiskIo,
    NetIo,
    Status,
    Temp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
}

impl Comparator {
    pub fn evaluate(self, value: f64, threshold: f64) -> bool {
        match self {
            Comparator::Gt => value > threshold,
            Comparator::Lt => value < threshold,
            Comparator::Ge => value >= threshold,
            Comparator::Le => value <= threshold,
            Comparator::Eq => (value - threshold).abs() < f64::EPSILON,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

/// Scope determines specificity when more than one rule could apply to a
/// (resource, metric) pair. More specific scopes win; ties are broken by
/// configuration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scope {
    Global,
    Tag(String),
    Resource(String),
}

impl Scope {
    /// Higher is more specific. Used to pick the effective rule when
    /// several rules match the same (resource, metric).
    pub fn specificity(&self) -> u8 {
        match self {
            Scope::Global => 0,
            Scope::Tag(_) => 1,
            Scope::Resource(_) => 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub scope: Scope,
    pub metric: Metric,
    pub comparator: Comparator,
    pub threshold: f64,
    pub level: AlertLevel,
    #[serde(default = "default_dwell")]
    pub dwell_time: Duration,
    /// Expressed as a fraction of the metric's scale (default 5%).
    #[serde(default = "default_hysteresis")]
    pub hysteresis: f64,
    pub enabled: bool,
    /// Position in the configuration file; used to break specificity ties.
    pub configuration_order: u32,
}

fn default_dwell() -> Duration {
    Duration::from_secs(30)
}

fn default_hysteresis() -> f64 {
    0.05
}

/// A live or resolved alert instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Stable hash of `resourceId + metric` (see `hashing::alert_id`).
    pub id: String,
    pub resource_id: String,
    pub resource_type: String,
    pub metric: Metric,
    pub threshold: f64,
    pub value: f64,
    pub level: AlertLevel,
    pub start_time: DateTime<Utc>,
    pub last_evaluated_at: DateTime<Utc>,
    pub acknowledged: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_scope_beats_tag_and_global() {
        assert!(Scope::Resource("x".into()).specificity() > Scope::Tag("y".into()).specificity());
        assert!(Scope::Tag("y".into()).specificity() > Scope::Global.specificity());
    }

    #[test]
    fn comparators_match_expected_semantics() {
        assert!(Comparator::Gt.evaluate(81.0, 80.0));
        assert!(!Comparator::Gt.evaluate(80.0, 80.0));
        assert!(Comparator::Ge.evaluate(80.0, 80.0));
        assert!(Comparator::Lt.evaluate(74.0, 75.0));
        assert!(Comparator::Le.evaluate(75.0, 75.0));
        assert!(Comparator::Eq.evaluate(1.0, 1.0));
    }
}
