// [apps/pulse-monitor/src/handlers/sources.rs]
//! `POST/PUT/DELETE /sources`: CRUD over the encrypted source list.
//! The scheduler only reads `sources.enc` at startup today, so edits
//! here take effect on next restart — acceptable for a thin config
//! surface, called out in the design ledger rather than silently implied.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pulse_domain::source::{AuthKind, Source};
use pulse_notify_transports::ssrf;
use uuid::Uuid;

use crate::state::AppState;

pub async fn create(State(state): State<AppState>, Json(mut source): Json<Source>) -> Response {
    if let Err(error) = ssrf::validate_at_configure_time(&source.endpoint).await {
        return (StatusCode::BAD_REQUEST, format!("endpoint rejected: {error}")).into_response();
    }
    if source.id.is_empty() {
        source.id = Uuid::new_v4().to_string();
    }

    let mut sources = match load_sources(&state).await {
        Ok(sources) => sources,
        Err(error) => return internal_error(error),
    };
    sources.push(source.clone());
    if let Err(error) = save_sources(&state, &sources).await {
        return internal_error(error);
    }
    (StatusCode::CREATED, Json(source)).into_response()
}

pub async fn update(State(state): State<AppState>, Path(id): Path<String>, Json(update): Json<Source>) -> Response {
    if let Err(error) = ssrf::validate_at_configure_time(&update.endpoint).await {
        return (StatusCode::BAD_REQUEST, format!("endpoint rejected: {error}")).into_response();
    }

    let mut sources = match load_sources(&state).await {
        Ok(sources) => sources,
        Err(error) => return internal_error(error),
    };
    let Some(existing) = sources.iter_mut().find(|source| source.id == id) else {
        return (StatusCode::NOT_FOUND, format!("source {id} not found")).into_response();
    };
    *existing = Source { id: id.clone(), ..update };

    if let Err(error) = save_sources(&state, &sources).await {
        return internal_error(error);
    }
    StatusCode::OK.into_response()
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let mut sources = match load_sources(&state).await {
        Ok(sources) => sources,
        Err(error) => return internal_error(error),
    };
    let before = sources.len();
    sources.retain(|source| source.id != id);
    if sources.len() == before {
        return (StatusCode::NOT_FOUND, format!("source {id} not found")).into_response();
    }

    if let Err(error) = save_sources(&state, &sources).await {
        return internal_error(error);
    }
    StatusCode::NO_CONTENT.into_response()
}

/// Auth secrets never leave the process: every entry is echoed back
/// with its credential replaced by a placeholder.
pub async fn list(State(state): State<AppState>) -> Response {
    let sources = match load_sources(&state).await {
        Ok(sources) => sources,
        Err(error) => return internal_error(error),
    };
    let redacted: Vec<Source> = sources.into_iter().map(redact_auth).collect();
    Json(redacted).into_response()
}

fn redact_auth(mut source: Source) -> Source {
    source.auth = match source.auth {
        AuthKind::ApiToken { token_id, .. } => AuthKind::ApiToken { token_id, secret: "***".into() },
        AuthKind::Password { username, .. } => AuthKind::Password { username, password: "***".into() },
    };
    source
}

async fn load_sources(state: &AppState) -> Result<Vec<Source>, pulse_secure_config::SecureConfigError> {
    pulse_secure_config::load_or_default(&state.config.sources_file(), &state.encryption_key).await
}

async fn save_sources(state: &AppState, sources: &[Source]) -> Result<(), pulse_secure_config::SecureConfigError> {
    pulse_secure_config::save(&state.config.sources_file(), &state.encryption_key, &sources.to_vec()).await
}

fn internal_error(error: pulse_secure_config::SecureConfigError) -> Response {
    tracing::error!(%error, "failed to persist source config");
    (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
}
