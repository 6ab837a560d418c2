// [libs/infra/metrics-ring/src/ring.rs]
//! Registry of per-`(resource, metric)` series. Memory is bounded
//! two ways: each series is itself bounded by count/age (`MetricSeries`),
//! and a per-resource cap on the number of distinct metric names limits
//! how much a single misbehaving resource — one reporting an unbounded
//! variety of metric names — can cost the process overall.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pulse_domain::identity::ResourceId;
use tracing::warn;

use crate::downsample::{downsample, Bucket};
use crate::series::{MetricSeries, DEFAULT_CAPACITY, DEFAULT_MAX_AGE};

const DEFAULT_MAX_SERIES_PER_RESOURCE: usize = 32;

pub struct MetricsRing {
    series: RwLock<HashMap<(ResourceId, String), MetricSeries>>,
    series_capacity: usize,
    max_age: Duration,
    max_series_per_resource: usize,
}

impl MetricsRing {
    pub fn new() -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            series_capacity: DEFAULT_CAPACITY,
            max_age: DEFAULT_MAX_AGE,
            max_series_per_resource: DEFAULT_MAX_SERIES_PER_RESOURCE,
        }
    }

    pub fn record(&self, resource_id: ResourceId, metric: &str, timestamp: DateTime<Utc>, value: f64) {
        let mut series = self.series.write().expect("metrics ring lock poisoned");

        let series_count_for_resource =
            series.keys().filter(|(existing_resource, _)| *existing_resource == resource_id).count();

        let key = (resource_id.clone(), metric.to_string());
        if !series.contains_key(&key) && series_count_for_resource >= self.max_series_per_resource {
            warn!(%resource_id, metric, "per-resource metric series cap reached, dropping new series");
            return;
        }

        series
            .entry(key)
            .or_insert_with(|| MetricSeries::new(self.series_capacity, self.max_age))
            .push(timestamp, value);
    }

    pub fn range(&self, resource_id: &ResourceId, metric: &str, from: DateTime<Utc>, to: DateTime<Utc>, max_points: usize) -> Vec<Bucket> {
        let series = self.series.read().expect("metrics ring lock poisoned");
        match series.get(&(resource_id.clone(), metric.to_string())) {
            Some(found) => downsample(&found.range(from, to), from, to, max_points),
            None => Vec::new(),
        }
    }

    pub fn series_count(&self) -> usize {
        self.series.read().expect("metrics ring lock poisoned").len()
    }
}

impl Default for MetricsRing {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn resource(id: &str) -> ResourceId {
        ResourceId { instance_id: "inst-1".into(), node_name: "node-1".into(), local_id: id.into() }
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    #[test]
    fn record_then_range_round_trips() {
        let ring = MetricsRing::new();
        let id = resource("vm-1");
        ring.record(id.clone(), "cpu", at(0), 0.5);
        ring.record(id.clone(), "cpu", at(10), 0.7);

        let buckets = ring.range(&id, "cpu", at(0), at(10), 10);
        assert_eq!(buckets.len(), 2);
    }

    #[test]
    fn enforces_per_resource_series_cap() {
        let ring = MetricsRing { max_series_per_resource: 1, ..MetricsRing::new() };
        let id = resource("vm-1");
        ring.record(id.clone(), "cpu", at(0), 1.0);
        ring.record(id.clone(), "mem", at(0), 1.0); // exceeds the cap, dropped

        assert_eq!(ring.series_count(), 1);
    }

    #[test]
    fn unknown_series_returns_empty_range() {
        let ring = MetricsRing::new();
        let id = resource("vm-1");
        assert!(ring.range(&id, "cpu", at(0), at(10), 5).is_empty());
    }
}
