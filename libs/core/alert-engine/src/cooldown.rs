// [libs/core/alert-engine/src/cooldown.rs]
//! Per-`(resourceId, metric)` cooldown tracking. Cooldown is set only
//! after a successful enqueue ack or a successful direct send, never
//! before.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

#[derive(Default)]
pub struct CooldownTracker {
    last_stamped: HashMap<String, DateTime<Utc>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `alert_id` was stamped within `window` of `now`; while true
    /// a repeated `AlertStarted` for the same alert must not enqueue a new
    /// notification.
    pub fn is_in_cooldown(&self, alert_id: &str, now: DateTime<Utc>, window: Duration) -> bool {
        self.last_stamped
            .get(alert_id)
            .map(|stamped_at| now - *stamped_at < window)
            .unwrap_or(false)
    }

    /// Records a successful enqueue acknowledgement or a successful direct
    /// send. Callers must never call this before the operation it records
    /// has actually succeeded.
    pub fn stamp(&mut self, alert_id: &str, now: DateTime<Utc>) {
        self.last_stamped.insert(alert_id.to_string(), now);
    }

    /// Drops an alert's cooldown entry outright, e.g. on `CancelAlert` or
    /// on resolution.
    pub fn clear(&mut self, alert_id: &str) {
        self.last_stamped.remove(alert_id);
    }

    /// Periodic sweep: drops entries older than 24h
    /// whose resource `still_exists` reports as gone. `still_exists` takes
    /// the alert id because callers key alerts by a hash of (resourceId,
    /// metric), not the raw resource id.
    pub fn prune(&mut self, now: DateTime<Utc>, max_age: Duration, still_exists: impl Fn(&str) -> bool) {
        self.last_stamped
            .retain(|alert_id, stamped_at| now - *stamped_at < max_age || still_exists(alert_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(seconds, 0).unwrap()
    }

    #[test]
    fn cooldown_blocks_reenqueue_until_window_elapses() {
        let mut tracker = CooldownTracker::new();
        let window = Duration::minutes(5);
        assert!(!tracker.is_in_cooldown("a1", at(0), window));

        tracker.stamp("a1", at(0));
        assert!(tracker.is_in_cooldown("a1", at(60), window));
        assert!(!tracker.is_in_cooldown("a1", at(301), window));
    }

    #[test]
    fn prune_drops_stale_entries_for_missing_resources() {
        let mut tracker = CooldownTracker::new();
        tracker.stamp("gone", at(0));
        tracker.stamp("still-here", at(0));

        tracker.prune(at(90_000), Duration::hours(24), |id| id == "still-here");

        assert!(!tracker.is_in_cooldown("gone", at(90_000), Duration::hours(48)));
        assert!(tracker.is_in_cooldown("still-here", at(90_000), Duration::hours(48)));
    }
}
