// [apps/pulse-monitor/src/handlers/metrics.rs]
//! `GET /metrics/{resource}/{metric}`: downsampled history from
//! `MetricsRing`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use pulse_domain::identity::ResourceId;
use pulse_metrics_ring::Bucket;
use serde::Deserialize;

use crate::state::AppState;

const DEFAULT_MAX_POINTS: usize = 200;

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    #[serde(rename = "maxPoints")]
    pub max_points: Option<usize>,
}

pub async fn get_metrics(
    State(state): State<AppState>,
    Path((resource, metric)): Path<(String, String)>,
    Query(query): Query<MetricsQuery>,
) -> Response {
    let Some(resource_id) = ResourceId::parse(&resource) else {
        return (StatusCode::BAD_REQUEST, "resource id must be \"instance:node:local\"").into_response();
    };

    let to = query.to.unwrap_or_else(Utc::now);
    let from = query.from.unwrap_or_else(|| to - chrono::Duration::hours(1));
    let max_points = query.max_points.unwrap_or(DEFAULT_MAX_POINTS);

    let buckets: Vec<Bucket> = state.metrics_ring.range(&resource_id, &metric, from, to, max_points);
    Json(buckets).into_response()
}
