// [libs/infra/notify-store/src/lib.rs]
//! Durable notification queue: crash-safe, at-least-once delivery
//! tracking backed by libSQL, with bounded attempts, exponential backoff,
//! a dead-letter queue, and cancellation on alert resolution.

pub mod client;
pub mod errors;
pub mod repository;
pub mod schema;

pub use client::NotifyStoreClient;
pub use errors::NotifyStoreError;
pub use repository::{NotificationRepository, QueueStats};
