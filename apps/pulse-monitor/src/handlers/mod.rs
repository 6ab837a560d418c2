// [apps/pulse-monitor/src/handlers/mod.rs]
//! Thin HTTP handlers for the public surface. Each handler reads or sends a
//! single message; all real logic lives in `aggregator`/`alerting`/the
//! infra crates.

pub mod alerts;
pub mod metrics;
pub mod notifications;
pub mod sources;
pub mod state;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Maps a notify-store error to a response: not-found is 404, everything
/// else is a 500 with the message logged but not echoed verbatim to the
/// caller.
pub fn notify_store_error_response(error: pulse_notify_store::NotifyStoreError) -> Response {
    use pulse_notify_store::NotifyStoreError::*;
    match error {
        NotFound(id) => (StatusCode::NOT_FOUND, format!("notification {id} not found")).into_response(),
        other => {
            tracing::error!(error = %other, "notification store error");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
        }
    }
}
