// [libs/core/domain/src/lib.rs]
//! Data model shared by every Pulse core crate: configured `Source`s, the
//! authoritative `ClusterState` they feed, alert and notification records,
//! and the small set of hashing helpers used to derive stable identities.
//!
//! This crate is intentionally free of I/O. Source clients, the notification
//! store, and the broadcaster all depend on these types without depending
//! on each other.

pub mod alert;
pub mod backup;
pub mod hashing;
pub mod health;
pub mod identity;
pub mod notification;
pub mod resources;
pub mod source;
pub mod state;

pub use alert::{Alert, AlertLevel, AlertRule, Comparator, Metric, Scope};
pub use backup::{BackupSnapshot, BackupType, CollisionSeverity, VmidCollision};
pub use hashing::content_hash;
pub use health::{SourceHealth, SourceStatus};
pub use identity::ResourceId;
pub use notification::{NotificationType, QueuedNotification, QueuedStatus};
pub use resources::{Container, Host, Node, PbsInstance, Storage, Vm};
pub use source::{AuthKind, Source, SourceKind, TlsPolicy};
pub use state::{ClusterState, EntityChange, StateDelta};
