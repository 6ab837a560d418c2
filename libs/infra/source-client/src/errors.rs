// [libs/infra/source-client/src/errors.rs]
//! Error taxonomy for a single source poll.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceClientError {
    #[error("authentication rejected by source: {0}")]
    Auth(String),

    #[error("source unreachable: {0}")]
    Unreachable(String),

    #[error("rate limited by source, retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("response did not match the expected schema: {0}")]
    Protocol(String),
}

impl SourceClientError {
    /// Whether the in-client retry loop should retry this error.
    /// Auth and protocol errors are configuration-shaped and never
    /// self-heal on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceClientError::Unreachable(_) | SourceClientError::RateLimited { .. })
    }
}

impl From<reqwest::Error> for SourceClientError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() || error.is_connect() {
            SourceClientError::Unreachable(error.to_string())
        } else if let Some(status) = error.status() {
            if status.as_u16() == 401 || status.as_u16() == 403 {
                SourceClientError::Auth(error.to_string())
            } else if status.as_u16() == 429 {
                SourceClientError::RateLimited { retry_after_secs: None }
            } else {
                SourceClientError::Unreachable(error.to_string())
            }
        } else {
            SourceClientError::Unreachable(error.to_string())
        }
    }
}
