// [apps/pulse-monitor/src/alerting.rs]
//! Wires `pulse_alert_engine`'s pure threshold/grouping/cooldown logic and
//! `pulse_notify_store`/`pulse_notify_transports` into the running process:
//! evaluating alert rules, grouping and queueing notifications, and
//! dispatching them through the configured delivery transports.
//!
//! [`AlertEvaluator`] holds the per-(resource, metric) FSM state and
//! cooldown/grouping trackers; it is driven by a tokio interval living in
//! [`run_alert_loop`], matching the alert-engine crate's own note that its
//! pure functions are meant to be called "on a cadence" from this crate.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pulse_alert_engine::{AlertFsm, AlertState, CooldownTracker, GroupingWindow, Transition};
use pulse_domain::alert::{Alert, AlertRule, Metric};
use pulse_domain::hashing::alert_id;
use pulse_domain::resources::Utilization;
use pulse_domain::state::ClusterState;
use pulse_notify_store::NotificationRepository;
use pulse_notify_transports::{AppriseConfig, AppriseTransport, EmailConfig, EmailTransport, TransportError, WebhookConfig, WebhookTransport};
use pulse_domain::notification::{NotificationPayload, NotificationType, QueuedNotification, QueuedStatus};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::aggregator::AggregatorMessage;

/// How long a group of newly-started alerts for the same resource waits
/// before being flushed as one notification batch.
const DEFAULT_GROUPING_WINDOW: chrono::Duration = chrono::Duration::seconds(30);
/// Once stamped, an alert id will not re-enqueue a notification for this
/// long.
const DEFAULT_COOLDOWN_WINDOW: chrono::Duration = chrono::Duration::minutes(15);
const DEFAULT_MAX_ATTEMPTS: u32 = 8;
const EVALUATION_PERIOD: Duration = Duration::from_secs(10);
const JANITOR_PERIOD: Duration = Duration::from_secs(60);
/// Twice the transports' own 30s send timeout, so a notification is only
/// reclaimed from "in flight" once a send attempt could not plausibly
/// still be running.
const RECLAIM_MAX_AGE: chrono::Duration = chrono::Duration::seconds(60);

/// Optional notification destinations. `None` channels are simply never
/// enqueued to, so operators can run with e.g. only a webhook configured.
#[derive(Debug, Clone, Default)]
pub struct NotificationChannels {
    pub webhook: Option<WebhookConfig>,
    pub email: Option<EmailConfig>,
    pub apprise: Option<AppriseConfig>,
}

pub struct Transports {
    webhook: WebhookTransport,
    email: EmailTransport,
    apprise: AppriseTransport,
}

impl Transports {
    pub fn new() -> Self {
        Self { webhook: WebhookTransport::new(), email: EmailTransport::new(), apprise: AppriseTransport::new() }
    }

    async fn dispatch(&self, notification: &QueuedNotification) -> Result<(), TransportError> {
        let context = serde_json::to_value(&notification.payload).unwrap_or(serde_json::Value::Null);
        match notification.notification_type {
            NotificationType::Webhook => {
                let config: WebhookConfig = serde_json::from_value(notification.payload.transport_config_snapshot.clone())
                    .map_err(|error| TransportError::Permanent(format!("invalid webhook config: {error}")))?;
                self.webhook.send(&config, &context).await
            }
            NotificationType::Email => {
                let config: EmailConfig = serde_json::from_value(notification.payload.transport_config_snapshot.clone())
                    .map_err(|error| TransportError::Permanent(format!("invalid email config: {error}")))?;
                self.email.send(&config, &context).await
            }
            NotificationType::Apprise => {
                let config: AppriseConfig = serde_json::from_value(notification.payload.transport_config_snapshot.clone())
                    .map_err(|error| TransportError::Permanent(format!("invalid apprise config: {error}")))?;
                self.apprise.send(&config, &context).await
            }
        }
    }
}

impl Default for Transports {
    fn default() -> Self {
        Self::new()
    }
}

fn metric_value(metric: Metric, utilization: &Utilization) -> Option<f64> {
    match metric {
        Metric::Cpu => Some(utilization.cpu_fraction * 100.0),
        Metric::Mem if utilization.mem_total_bytes > 0 => {
            Some(utilization.mem_used_bytes as f64 / utilization.mem_total_bytes as f64 * 100.0)
        }
        Metric::Disk if utilization.disk_total_bytes > 0 => {
            Some(utilization.disk_used_bytes as f64 / utilization.disk_total_bytes as f64 * 100.0)
        }
        Metric::NetIo => Some(utilization.net_in_bytes_per_sec + utilization.net_out_bytes_per_sec),
        // DiskIo/Status/Temp aren't reported by either source client's
        // current field set; a rule targeting them simply never fires.
        _ => None,
    }
}

struct Candidate {
    resource_id: String,
    resource_type: &'static str,
    tags: Vec<String>,
    metric: Metric,
    value: f64,
}

fn candidates(state: &ClusterState) -> Vec<Candidate> {
    let mut out = Vec::new();
    for node in state.nodes.values() {
        for metric in [Metric::Cpu, Metric::Mem, Metric::NetIo] {
            if let Some(value) = metric_value(metric, &node.utilization) {
                out.push(Candidate { resource_id: node.id.display_id(), resource_type: "node", tags: vec![], metric, value });
            }
        }
    }
    for vm in state.vms.values() {
        for metric in [Metric::Cpu, Metric::Mem, Metric::Disk, Metric::NetIo] {
            if let Some(value) = metric_value(metric, &vm.utilization) {
                out.push(Candidate { resource_id: vm.id.display_id(), resource_type: "vm", tags: vm.tags.clone(), metric, value });
            }
        }
    }
    for container in state.containers.values() {
        for metric in [Metric::Cpu, Metric::Mem, Metric::Disk, Metric::NetIo] {
            if let Some(value) = metric_value(metric, &container.utilization) {
                out.push(Candidate {
                    resource_id: container.id.display_id(),
                    resource_type: "container",
                    tags: container.tags.clone(),
                    metric,
                    value,
                });
            }
        }
    }
    for storage in state.storages.values() {
        if storage.total_bytes > 0 {
            out.push(Candidate {
                resource_id: storage.id.display_id(),
                resource_type: "storage",
                tags: vec![],
                metric: Metric::Disk,
                value: storage.used_bytes as f64 / storage.total_bytes as f64 * 100.0,
            });
        }
    }
    out
}

pub struct EvaluationOutcome {
    pub started: Vec<Alert>,
    pub resolved: Vec<String>,
}

/// Owns the FSM state, cooldown tracker, and grouping window across
/// evaluation ticks. Not `Send`-shared; one evaluator runs inside a
/// single background task.
pub struct AlertEvaluator {
    rules: Vec<AlertRule>,
    fsm_states: HashMap<String, AlertState>,
    cooldown: CooldownTracker,
    grouping: GroupingWindow,
}

impl AlertEvaluator {
    pub fn new(rules: Vec<AlertRule>) -> Self {
        Self {
            rules,
            fsm_states: HashMap::new(),
            cooldown: CooldownTracker::new(),
            grouping: GroupingWindow::new(DEFAULT_GROUPING_WINDOW),
        }
    }

    /// One evaluation pass over the current cluster state: select the
    /// effective rule per candidate metric, step its FSM, and collect
    /// started/resolved alerts for the caller to apply to shared state.
    pub fn evaluate(&mut self, state: &ClusterState, now: DateTime<Utc>) -> EvaluationOutcome {
        let mut started = Vec::new();
        let mut resolved = Vec::new();

        for candidate in candidates(state) {
            let Some(rule) = pulse_alert_engine::select_effective_rule(&self.rules, &candidate.resource_id, &candidate.tags, candidate.metric)
            else {
                continue;
            };

            let id = alert_id(&candidate.resource_id, metric_key(candidate.metric));
            let previous = self.fsm_states.get(&id).copied().unwrap_or(AlertState::Clear);
            let dwell = chrono::Duration::from_std(rule.dwell_time).unwrap_or(chrono::Duration::seconds(30));

            let (next, transition) =
                AlertFsm::step(previous, rule.comparator, rule.threshold, rule.hysteresis, candidate.value, dwell, now);
            self.fsm_states.insert(id.clone(), next);

            match transition {
                Transition::Started => {
                    let alert = Alert {
                        id: id.clone(),
                        resource_id: candidate.resource_id.clone(),
                        resource_type: candidate.resource_type.to_string(),
                        metric: candidate.metric,
                        threshold: rule.threshold,
                        value: candidate.value,
                        level: rule.level,
                        start_time: now,
                        last_evaluated_at: now,
                        acknowledged: false,
                        resolved_at: None,
                    };
                    self.grouping.add_started(&candidate.resource_id, &id, now);
                    started.push(alert);
                }
                Transition::Resolved => {
                    self.cooldown.clear(&id);
                    resolved.push(id);
                }
                Transition::None => {}
            }
        }

        EvaluationOutcome { started, resolved }
    }

    /// Flushes grouping windows that have elapsed, returning
    /// `(resource_id, alert_ids)` batches ready for enqueue.
    pub fn drain_ready_groups(&mut self, now: DateTime<Utc>) -> Vec<(String, Vec<String>)> {
        self.grouping.drain_ready(now)
    }

    pub fn is_in_cooldown(&self, alert_id: &str, now: DateTime<Utc>) -> bool {
        self.cooldown.is_in_cooldown(alert_id, now, DEFAULT_COOLDOWN_WINDOW)
    }

    /// Must only be called after the notification referencing `alert_id`
    /// has actually been enqueued successfully.
    pub fn stamp_cooldown(&mut self, alert_id: &str, now: DateTime<Utc>) {
        self.cooldown.stamp(alert_id, now);
    }

    pub fn prune_cooldowns(&mut self, now: DateTime<Utc>, state: &ClusterState) {
        self.cooldown.prune(now, chrono::Duration::hours(24), |id| state.active_alerts.contains_key(id));
    }
}

fn metric_key(metric: Metric) -> &'static str {
    match metric {
        Metric::Cpu => "cpu",
        Metric::Mem => "mem",
        Metric::Disk => "disk",
        Metric::DiskIo => "disk_io",
        Metric::NetIo => "net_io",
        Metric::Status => "status",
        Metric::Temp => "temp",
    }
}

/// Pseudo source id under which a queue-enqueue failure is recorded in
/// `ClusterState.source_health`, so the failure is visible on the same
/// health surface a real source's outage would be.
const NOTIFICATION_QUEUE_HEALTH_ID: &str = "notification-queue";

/// Enqueues one notification per configured channel for a drained group,
/// stamping cooldown on each alert only once every enqueue has
/// succeeded. If the durable enqueue itself fails, falls back to a
/// best-effort direct send through `transports` (no retry, no durability)
/// and reports the failure through `aggregator_tx` so it surfaces in
/// health rather than disappearing into a log line.
async fn enqueue_group(
    repository: &NotificationRepository,
    transports: &Transports,
    channels: &NotificationChannels,
    evaluator: &mut AlertEvaluator,
    aggregator_tx: &mpsc::UnboundedSender<AggregatorMessage>,
    alert_ids: Vec<String>,
    now: DateTime<Utc>,
) {
    let due: Vec<String> = alert_ids.into_iter().filter(|id| !evaluator.is_in_cooldown(id, now)).collect();
    if due.is_empty() {
        return;
    }

    let payload = NotificationPayload {
        alert_ids: due.clone(),
        transport_config_snapshot: serde_json::Value::Null,
        primary_alert_id: due.first().cloned(),
    };

    let mut any_enqueued = false;
    for (notification_type, config) in configured_channels(channels) {
        let mut payload = payload.clone();
        payload.transport_config_snapshot = config;

        match repository.enqueue(notification_type, payload.clone(), DEFAULT_MAX_ATTEMPTS).await {
            Ok(_) => any_enqueued = true,
            Err(error) => {
                warn!(%error, "failed to enqueue notification, falling back to direct send");
                let fallback = QueuedNotification {
                    id: String::new(),
                    notification_type,
                    status: QueuedStatus::Sending,
                    payload,
                    attempts: 0,
                    max_attempts: DEFAULT_MAX_ATTEMPTS,
                    last_attempt_at: Some(now),
                    last_error: None,
                    created_at: now,
                    next_retry_at: now,
                    completed_at: None,
                };
                match transports.dispatch(&fallback).await {
                    Ok(()) => any_enqueued = true,
                    Err(send_error) => error!(%send_error, "direct-send fallback also failed"),
                }
                let _ = aggregator_tx.send(AggregatorMessage::SourceDegraded {
                    source_id: NOTIFICATION_QUEUE_HEALTH_ID.to_string(),
                    error: error.to_string(),
                    at: now,
                });
            }
        }
    }

    if any_enqueued {
        for alert_id in &due {
            evaluator.stamp_cooldown(alert_id, now);
        }
    }
}

fn configured_channels(channels: &NotificationChannels) -> Vec<(NotificationType, serde_json::Value)> {
    let mut out = Vec::new();
    if let Some(webhook) = &channels.webhook {
        out.push((NotificationType::Webhook, serde_json::to_value(webhook).expect("webhook config always serializable")));
    }
    if let Some(email) = &channels.email {
        out.push((NotificationType::Email, serde_json::to_value(email).expect("email config always serializable")));
    }
    if let Some(apprise) = &channels.apprise {
        out.push((NotificationType::Apprise, serde_json::to_value(apprise).expect("apprise config always serializable")));
    }
    out
}

/// Drives [`AlertEvaluator`] from a periodic tick: evaluate, apply
/// started/resolved alerts back through the aggregator (the single state
/// writer), flush ready groups, and enqueue their notifications.
pub async fn run_alert_loop(
    mut evaluator: AlertEvaluator,
    repository: Arc<NotificationRepository>,
    channels: NotificationChannels,
    mut state_rx: mpsc::UnboundedReceiver<Arc<ClusterState>>,
    aggregator_tx: mpsc::UnboundedSender<AggregatorMessage>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(EVALUATION_PERIOD);
    let mut latest_state: Option<Arc<ClusterState>> = None;
    let transports = Transports::new();

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            maybe_state = state_rx.recv() => {
                match maybe_state {
                    Some(state) => latest_state = Some(state),
                    None => break,
                }
            }
            _ = interval.tick() => {
                let Some(state) = latest_state.clone() else { continue };
                let now = Utc::now();

                let outcome = evaluator.evaluate(&state, now);
                if !outcome.started.is_empty() || !outcome.resolved.is_empty() {
                    for alert_id in &outcome.resolved {
                        if let Err(error) = repository.cancel_by_alert(alert_id).await {
                            warn!(%error, alert_id, "failed to cancel queued notifications on resolution");
                        }
                    }
                    let _ = aggregator_tx.send(AggregatorMessage::AlertUpdate { started: outcome.started, resolved: outcome.resolved });
                }

                for (_, alert_ids) in evaluator.drain_ready_groups(now) {
                    enqueue_group(&repository, &transports, &channels, &mut evaluator, &aggregator_tx, alert_ids, now).await;
                }
                evaluator.prune_cooldowns(now, &state);
            }
        }
    }
    info!("alert evaluation loop stopped");
}

async fn run_notification_worker(repository: Arc<NotificationRepository>, transports: Arc<Transports>, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        match repository.claim_next(Utc::now()).await {
            Ok(Some(notification)) => {
                let result = transports.dispatch(&notification).await;
                match result {
                    Ok(()) => {
                        let _ = repository.mark_sent(&notification.id, Utc::now()).await;
                    }
                    Err(error) => {
                        let permanent = matches!(error, TransportError::Permanent(_) | TransportError::BlockedAddress(_));
                        if permanent || notification.attempts >= notification.max_attempts {
                            let _ = repository.mark_dlq(&notification.id, &error.to_string()).await;
                        } else {
                            let _ = repository
                                .mark_retry(&notification.id, notification.attempts, &error.to_string(), None, Utc::now())
                                .await;
                        }
                    }
                }
            }
            Ok(None) => {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(500)) => {}
                    _ = shutdown.changed() => break,
                }
            }
            Err(error) => {
                warn!(%error, "notification repository unavailable, backing off");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

async fn run_janitor(repository: Arc<NotificationRepository>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(JANITOR_PERIOD);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = interval.tick() => {
                if let Err(error) = repository.reclaim_stuck(RECLAIM_MAX_AGE, Utc::now()).await {
                    warn!(%error, "janitor sweep failed");
                }
            }
        }
    }
}

pub struct NotificationWorkerPool {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl NotificationWorkerPool {
    pub fn spawn(worker_count: usize, repository: Arc<NotificationRepository>) -> Self {
        let transports = Arc::new(Transports::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut handles: Vec<JoinHandle<()>> = (0..worker_count)
            .map(|_| tokio::spawn(run_notification_worker(repository.clone(), transports.clone(), shutdown_rx.clone())))
            .collect();
        handles.push(tokio::spawn(run_janitor(repository, shutdown_rx)));

        Self { shutdown_tx, handles }
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = tokio::time::timeout(crate::scheduler::SHUTDOWN_DEADLINE, futures::future::join_all(self.handles)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_domain::alert::{AlertLevel, Comparator, Scope};
    use pulse_domain::identity::ResourceId;
    use pulse_domain::resources::{RunState, Vm};

    fn util(cpu: f64) -> Utilization {
        Utilization {
            cpu_fraction: cpu,
            mem_used_bytes: 0,
            mem_total_bytes: 0,
            disk_used_bytes: 0,
            disk_total_bytes: 0,
            net_in_bytes_per_sec: 0.0,
            net_out_bytes_per_sec: 0.0,
        }
    }

    fn rule() -> AlertRule {
        AlertRule {
            id: "r1".into(),
            scope: Scope::Global,
            metric: Metric::Cpu,
            comparator: Comparator::Gt,
            threshold: 80.0,
            level: AlertLevel::Warning,
            dwell_time: Duration::from_secs(0),
            hysteresis: 0.05,
            enabled: true,
            configuration_order: 0,
        }
    }

    fn state_with_vm(cpu_fraction: f64) -> ClusterState {
        let mut state = ClusterState::new();
        let id = ResourceId::new("pve-a", "node1", "100");
        state.vms.insert(
            id.clone(),
            Vm { id, vmid: 100, name: "web".into(), state: RunState::Running, utilization: util(cpu_fraction), tags: vec![], stale: false },
        );
        state
    }

    #[test]
    fn evaluate_starts_alert_once_threshold_and_zero_dwell_satisfied() {
        let mut evaluator = AlertEvaluator::new(vec![rule()]);
        let now = Utc::now();
        let outcome = evaluator.evaluate(&state_with_vm(0.9), now);
        assert_eq!(outcome.started.len(), 1);
        assert_eq!(outcome.started[0].resource_id, "pve-a:node1:100");
    }

    #[test]
    fn evaluate_is_idempotent_once_active() {
        let mut evaluator = AlertEvaluator::new(vec![rule()]);
        let now = Utc::now();
        evaluator.evaluate(&state_with_vm(0.9), now);
        let outcome = evaluator.evaluate(&state_with_vm(0.91), now + chrono::Duration::seconds(10));
        assert!(outcome.started.is_empty());
        assert!(outcome.resolved.is_empty());
    }

    #[test]
    fn drain_ready_groups_respects_window() {
        let mut evaluator = AlertEvaluator::new(vec![rule()]);
        let now = Utc::now();
        evaluator.evaluate(&state_with_vm(0.9), now);
        assert!(evaluator.drain_ready_groups(now + chrono::Duration::seconds(5)).is_empty());
        let ready = evaluator.drain_ready_groups(now + DEFAULT_GROUPING_WINDOW + chrono::Duration::seconds(1));
        assert_eq!(ready.len(), 1);
    }
}
