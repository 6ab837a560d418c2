// [libs/infra/metrics-ring/src/series.rs]
//! A single `(resourceId, metricName)` time series: bounded by
//! both sample count and age, with 1s write-path coalescing so a burst
//! of near-simultaneous writes from slightly skewed poller ticks does
//! not inflate the ring with near-duplicate points.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CAPACITY: usize = 8640; // 24h at 10s granularity
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);
const COALESCE_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

pub struct MetricSeries {
    samples: VecDeque<Sample>,
    capacity: usize,
    max_age: Duration,
}

impl MetricSeries {
    pub fn new(capacity: usize, max_age: Duration) -> Self {
        Self { samples: VecDeque::with_capacity(capacity), capacity, max_age }
    }

    /// Appends a sample, coalescing with the last one if it arrived
    /// within `COALESCE_WINDOW`, and evicts anything now too old or over
    /// capacity. Timestamps are expected strictly increasing across
    /// non-coalesced writes; an out-of-order write is coalesced into the
    /// last sample instead of silently violating that invariant.
    pub fn push(&mut self, timestamp: DateTime<Utc>, value: f64) {
        if let Some(last) = self.samples.back_mut() {
            if timestamp <= last.timestamp + COALESCE_WINDOW {
                last.value = value;
                last.timestamp = last.timestamp.max(timestamp);
                return;
            }
        }

        self.samples.push_back(Sample { timestamp, value });
        self.evict_stale(timestamp);

        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    fn evict_stale(&mut self, now: DateTime<Utc>) {
        let cutoff = now - chrono::Duration::from_std(self.max_age).unwrap_or(chrono::Duration::zero());
        while let Some(front) = self.samples.front() {
            if front.timestamp < cutoff {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<Sample> {
        self.samples.iter().filter(|sample| sample.timestamp >= from && sample.timestamp <= to).copied().collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last_write(&self) -> Option<DateTime<Utc>> {
        self.samples.back().map(|sample| sample.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    #[test]
    fn coalesces_writes_within_one_second() {
        let mut series = MetricSeries::new(10, Duration::from_secs(3600));
        series.push(at(0), 1.0);
        series.push(at(0), 2.0); // same instant, different value: coalesced
        assert_eq!(series.len(), 1);
        assert_eq!(series.range(at(0), at(0))[0].value, 2.0);
    }

    #[test]
    fn evicts_over_capacity() {
        let mut series = MetricSeries::new(3, Duration::from_secs(3600));
        for i in 0..5 {
            series.push(at(i * 10), i as f64);
        }
        assert_eq!(series.len(), 3);
    }

    #[test]
    fn evicts_samples_older_than_max_age() {
        let mut series = MetricSeries::new(100, Duration::from_secs(60));
        series.push(at(0), 1.0);
        series.push(at(120), 2.0); // 120s later, outside the 60s retention window
        assert_eq!(series.len(), 1);
    }
}
