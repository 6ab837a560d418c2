// [libs/infra/metrics-ring/src/lib.rs]
//! Bounded per-resource time-series storage for chart history.

pub mod downsample;
pub mod ring;
pub mod series;

pub use downsample::Bucket;
pub use ring::MetricsRing;
pub use series::{MetricSeries, Sample};
