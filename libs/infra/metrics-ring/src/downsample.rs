// [libs/infra/metrics-ring/src/downsample.rs]
//! On-read downsampling: buckets raw samples into at most
//! `max_points` buckets, keeping min/max/avg per bucket so a chart can
//! still show spikes that a plain average would smooth away.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::series::Sample;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub timestamp: DateTime<Utc>,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

pub fn downsample(samples: &[Sample], from: DateTime<Utc>, to: DateTime<Utc>, max_points: usize) -> Vec<Bucket> {
    if samples.is_empty() || max_points == 0 {
        return Vec::new();
    }

    if samples.len() <= max_points {
        return samples
            .iter()
            .map(|sample| Bucket { timestamp: sample.timestamp, min: sample.value, max: sample.value, avg: sample.value })
            .collect();
    }

    let span = (to - from).num_milliseconds().max(1);
    let bucket_width_ms = (span / max_points as i64).max(1);

    let mut buckets: Vec<Bucket> = Vec::with_capacity(max_points);
    let mut current_bucket_index = -1i64;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    let mut count = 0u32;
    let mut bucket_start = from;

    let flush = |buckets: &mut Vec<Bucket>, bucket_start: DateTime<Utc>, min: f64, max: f64, sum: f64, count: u32| {
        if count > 0 {
            buckets.push(Bucket { timestamp: bucket_start, min, max, avg: sum / count as f64 });
        }
    };

    for sample in samples {
        let offset_ms = (sample.timestamp - from).num_milliseconds().max(0);
        let bucket_index = offset_ms / bucket_width_ms;

        if bucket_index != current_bucket_index {
            flush(&mut buckets, bucket_start, min, max, sum, count);
            current_bucket_index = bucket_index;
            bucket_start = sample.timestamp;
            min = f64::INFINITY;
            max = f64::NEG_INFINITY;
            sum = 0.0;
            count = 0;
        }

        min = min.min(sample.value);
        max = max.max(sample.value);
        sum += sample.value;
        count += 1;
    }
    flush(&mut buckets, bucket_start, min, max, sum, count);

    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    fn sample(seconds: i64, value: f64) -> Sample {
        Sample { timestamp: at(seconds), value }
    }

    #[test]
    fn passthrough_when_under_max_points() {
        let samples = vec![sample(0, 1.0), sample(10, 2.0)];
        let buckets = downsample(&samples, at(0), at(10), 10);
        assert_eq!(buckets.len(), 2);
    }

    #[test]
    fn preserves_spikes_via_min_max() {
        let samples: Vec<Sample> = (0..20).map(|i| sample(i, if i == 10 { 100.0 } else { 1.0 })).collect();
        let buckets = downsample(&samples, at(0), at(19), 4);
        assert!(buckets.iter().any(|bucket| bucket.max >= 100.0));
    }

    #[test]
    fn empty_input_yields_no_buckets() {
        assert!(downsample(&[], at(0), at(10), 5).is_empty());
    }
}
