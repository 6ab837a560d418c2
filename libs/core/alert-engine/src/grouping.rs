// [libs/core/alert-engine/src/grouping.rs]
//! Per-resource grouping window: newly started
//! alerts for the same resource accumulate for `window` before being
//! handed to the notification queue as one batch.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

struct PendingGroup {
    opened_at: DateTime<Utc>,
    alert_ids: Vec<String>,
}

pub struct GroupingWindow {
    window: Duration,
    groups: HashMap<String, PendingGroup>,
}

impl GroupingWindow {
    pub fn new(window: Duration) -> Self {
        Self { window, groups: HashMap::new() }
    }

    /// Adds a newly started alert to its resource's group, opening the
    /// group if this is the first alert seen for that resource.
    pub fn add_started(&mut self, resource_id: &str, alert_id: &str, now: DateTime<Utc>) {
        self.groups
            .entry(resource_id.to_string())
            .or_insert_with(|| PendingGroup { opened_at: now, alert_ids: Vec::new() })
            .alert_ids
            .push(alert_id.to_string());
    }

    /// Returns `(resource_id, alert_ids)` for every group whose window has
    /// elapsed as of `now`, removing them from internal state.
    pub fn drain_ready(&mut self, now: DateTime<Utc>) -> Vec<(String, Vec<String>)> {
        let ready: Vec<String> = self
            .groups
            .iter()
            .filter(|(_, group)| now - group.opened_at >= self.window)
            .map(|(resource_id, _)| resource_id.clone())
            .collect();

        ready
            .into_iter()
            .filter_map(|resource_id| self.groups.remove(&resource_id).map(|g| (resource_id, g.alert_ids)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(seconds, 0).unwrap()
    }

    #[test]
    fn group_flushes_only_after_window_elapses() {
        let mut window = GroupingWindow::new(Duration::seconds(30));
        window.add_started("r1", "a1", at(0));
        window.add_started("r1", "a2", at(5));

        assert!(window.drain_ready(at(10)).is_empty());

        let ready = window.drain_ready(at(35));
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].0, "r1");
        assert_eq!(ready[0].1, vec!["a1".to_string(), "a2".to_string()]);

        // group was removed after draining
        assert!(window.drain_ready(at(100)).is_empty());
    }

    #[test]
    fn distinct_resources_group_independently() {
        let mut window = GroupingWindow::new(Duration::seconds(30));
        window.add_started("r1", "a1", at(0));
        window.add_started("r2", "a2", at(20));

        let ready = window.drain_ready(at(31));
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].0, "r1");
    }
}
