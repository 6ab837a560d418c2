// [libs/infra/notify-store/src/errors.rs]
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifyStoreError {
    #[error("database connection failed: {0}")]
    Connection(String),

    #[error("query failed: {0}")]
    Query(#[from] libsql::Error),

    #[error("failed to map row to domain type: {0}")]
    Mapping(String),

    #[error("notification {0} not found")]
    NotFound(String),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}
