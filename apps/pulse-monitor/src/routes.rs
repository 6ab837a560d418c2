// [apps/pulse-monitor/src/routes.rs]
//! Wires the HTTP/WebSocket surface into a single `Router`: one CORS
//! layer, handlers grouped by resource, `/ws` nested separately because
//! it carries its own narrower state type.

use std::time::Duration;

use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{alerts, metrics, notifications, sources, state as state_handlers};
use crate::state::AppState;

pub fn build_router(application_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    let alert_routes = Router::new().route("/alerts/active", get(alerts::list_active)).route("/alerts/:id/ack", post(alerts::ack));

    let notification_routes = Router::new()
        .route("/notifications/queue/stats", get(notifications::queue_stats))
        .route("/notifications/health", get(notifications::health))
        .route("/notifications/dlq", get(notifications::list_dlq))
        .route("/notifications/dlq/:id/retry", post(notifications::retry_dlq))
        .route("/notifications/dlq/:id/delete", post(notifications::delete_dlq));

    let source_routes = Router::new()
        .route("/sources", get(sources::list).post(sources::create))
        .route("/sources/:id", axum::routing::put(sources::update).delete(sources::delete));

    let ws_router = Router::new().route("/ws", get(pulse_broadcast::upgrade)).with_state(application_state.ws_state());

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/state", get(state_handlers::get_state))
        .route("/metrics/:resource/:metric", get(metrics::get_metrics))
        .merge(alert_routes)
        .merge(notification_routes)
        .merge(source_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(application_state)
        .merge(ws_router)
}
