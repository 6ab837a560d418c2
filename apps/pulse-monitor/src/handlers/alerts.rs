// [apps/pulse-monitor/src/handlers/alerts.rs]
//! `GET /alerts/active` and `POST /alerts/{id}/ack`. Acknowledgement
//! is routed through the aggregator's single-writer channel rather than
//! locking `cluster_state` here directly.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pulse_domain::alert::Alert;

use crate::aggregator::AggregatorMessage;
use crate::state::AppState;

pub async fn list_active(State(state): State<AppState>) -> Json<Vec<Alert>> {
    let cluster_state = state.cluster_state.read().await;
    Json(cluster_state.active_alerts.values().cloned().collect())
}

pub async fn ack(State(state): State<AppState>, Path(alert_id): Path<String>) -> Response {
    if state.aggregator_tx.send(AggregatorMessage::AckAlert(alert_id)).is_err() {
        return (StatusCode::SERVICE_UNAVAILABLE, "aggregator task is not running").into_response();
    }
    StatusCode::ACCEPTED.into_response()
}
