// [apps/pulse-monitor/src/handlers/notifications.rs]
//! Notification queue surface: dead-letter inspection/retry/delete
//! and queue health/stats, both backed by `NotificationRepository`.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use crate::handlers::notify_store_error_response;
use crate::state::AppState;

const DEFAULT_DLQ_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct DlqQuery {
    pub limit: Option<i64>,
}

pub async fn list_dlq(State(state): State<AppState>, Query(query): Query<DlqQuery>) -> Response {
    match state.notifications.list_dlq(query.limit.unwrap_or(DEFAULT_DLQ_LIMIT)).await {
        Ok(rows) => Json(rows).into_response(),
        Err(error) => notify_store_error_response(error),
    }
}

pub async fn retry_dlq(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.notifications.requeue_from_dlq(&id, Utc::now()).await {
        Ok(()) => axum::http::StatusCode::ACCEPTED.into_response(),
        Err(error) => notify_store_error_response(error),
    }
}

pub async fn delete_dlq(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.notifications.delete(&id).await {
        Ok(()) => axum::http::StatusCode::NO_CONTENT.into_response(),
        Err(error) => notify_store_error_response(error),
    }
}

pub async fn queue_stats(State(state): State<AppState>) -> Response {
    match state.notifications.queue_stats().await {
        Ok(stats) => Json(stats).into_response(),
        Err(error) => notify_store_error_response(error),
    }
}

/// Queue health is the same counters as `queue_stats`; a dedicated route
/// exists so a monitoring probe doesn't need to know the stats shape,
/// only that a 200 means the store is reachable.
pub async fn health(State(state): State<AppState>) -> Response {
    match state.notifications.queue_stats().await {
        Ok(_) => axum::http::StatusCode::OK.into_response(),
        Err(error) => notify_store_error_response(error),
    }
}
