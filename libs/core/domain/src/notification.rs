// [libs/core/domain/src/notification.rs]
//! `QueuedNotification` — the durable record tracked by the
//! notification queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Email,
    Webhook,
    Apprise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuedStatus {
    Pending,
    Sending,
    Sent,
    Failed,
    Dlq,
    Cancelled,
}

impl QueuedStatus {
    /// Whether `self -> next` is a legal transition under the DAG
    /// `pending -> sending -> {sent | pending(retry) | dlq |
    /// cancelled}`. `Cancel` also reaches `Pending` rows directly.
    pub fn can_transition_to(self, next: QueuedStatus) -> bool {
        use QueuedStatus::*;
        matches!(
            (self, next),
            (Pending, Sending)
                | (Pending, Cancelled)
                | (Sending, Sent)
                | (Sending, Pending)
                | (Sending, Dlq)
                | (Sending, Cancelled)
        )
    }
}

/// A batch of alerts plus a frozen snapshot of the transport configuration
/// that should be used to deliver them, so a later edit to transport
/// config does not change the rendering of an already-queued notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub alert_ids: Vec<String>,
    pub transport_config_snapshot: serde_json::Value,
    /// Set when the batch originates from a single alert's lifecycle, so
    /// `Cancel(alertId)` can find every still-pending row referencing it.
    pub primary_alert_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedNotification {
    pub id: String,
    pub notification_type: NotificationType,
    pub status: QueuedStatus,
    pub payload: NotificationPayload,
    pub attempts: u32,
    pub max_attempts: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub next_retry_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_dag_allows_only_documented_edges() {
        use QueuedStatus::*;
        assert!(Pending.can_transition_to(Sending));
        assert!(Sending.can_transition_to(Sent));
        assert!(Sending.can_transition_to(Pending));
        assert!(Sending.can_transition_to(Dlq));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(!Sent.can_transition_to(Pending));
        assert!(!Dlq.can_transition_to(Pending));
        assert!(!Cancelled.can_transition_to(Sending));
        assert!(!Pending.can_transition_to(Dlq));
    }
}
