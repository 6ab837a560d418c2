// [apps/pulse-monitor/src/scheduler.rs]
//! The poller scheduler: one cooperative task per configured source,
//! staggered so every source doesn't dial its host on the same tick,
//! sequential (never-overlapping) polling per source, and exponential
//! backoff with full jitter on failure.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use pulse_domain::source::{Source, SourceKind};
use pulse_source_client::{MockPbsClient, MockPveClient, PbsClient, PveClient, SharedTransport, SourceClient};
use rand::Rng;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::aggregator::AggregatorMessage;

/// Backoff never grows past this multiple of the source's base poll
/// interval.
const MAX_BACKOFF_MULTIPLIER: f64 = 8.0;
const BACKOFF_GROWTH: f64 = 1.5;
/// Absolute backoff ceiling regardless of the source's base poll
/// interval, so a source configured with a long base interval can't
/// back off for unreasonably long stretches.
const MAX_BACKOFF_WAIT: Duration = Duration::from_secs(300);
/// How long a shutdown waits for an in-flight poll to finish before the
/// process moves on without it.
pub const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub struct PollDefaults {
    pub pve: Duration,
    pub pbs: Duration,
}

struct BackoffState {
    base: Duration,
    multiplier: f64,
}

impl BackoffState {
    fn new(base: Duration) -> Self {
        Self { base, multiplier: 1.0 }
    }

    fn bump(&mut self) {
        self.multiplier = (self.multiplier * BACKOFF_GROWTH).min(MAX_BACKOFF_MULTIPLIER);
    }

    fn reset(&mut self) {
        self.multiplier = 1.0;
    }

    /// The next wait, with full jitter: a uniform draw between zero and
    /// the computed backoff ceiling, so sources recovering at the same
    /// time don't re-synchronize against their host.
    fn next_wait(&self) -> Duration {
        let ceiling = self.base.mul_f64(self.multiplier).min(MAX_BACKOFF_WAIT);
        let jittered_millis = rand::thread_rng().gen_range(0..=ceiling.as_millis().max(1) as u64);
        Duration::from_millis(jittered_millis)
    }
}

fn build_client(source: &Source, transport: Arc<SharedTransport>, mock_mode: bool) -> Box<dyn SourceClient> {
    if mock_mode {
        return match source.kind {
            SourceKind::Pve => Box::new(MockPveClient::new(3, 12)),
            SourceKind::Pbs => Box::new(MockPbsClient::new(2)),
        };
    }
    match source.kind {
        SourceKind::Pve => Box::new(PveClient::new(source.clone(), transport)),
        SourceKind::Pbs => Box::new(PbsClient::new(source.clone(), transport)),
    }
}

async fn run_source(
    source: Source,
    transport: Arc<SharedTransport>,
    mock_mode: bool,
    defaults: PollDefaults,
    aggregator_tx: mpsc::UnboundedSender<AggregatorMessage>,
    mut shutdown: watch::Receiver<bool>,
) {
    let interval = source.poll_interval(defaults.pve, defaults.pbs);

    // Staggered start: a uniform jitter across one full interval so a
    // fleet of sources configured together doesn't all dial in lockstep.
    let stagger = Duration::from_millis(rand::thread_rng().gen_range(0..=interval.as_millis().max(1) as u64));
    tokio::select! {
        _ = tokio::time::sleep(stagger) => {}
        _ = shutdown.changed() => return,
    }

    let client = build_client(&source, transport, mock_mode);
    let mut backoff = BackoffState::new(interval);

    loop {
        if *shutdown.borrow() {
            break;
        }

        let started = Instant::now();
        match client.snapshot().await {
            Ok(snapshot) => {
                backoff.reset();
                let _ = aggregator_tx.send(AggregatorMessage::PollSuccess {
                    source_id: source.id.clone(),
                    snapshot,
                    received_at: Utc::now(),
                });
            }
            Err(error) => {
                warn!(source_id = %source.id, %error, "poll failed");
                let _ = aggregator_tx.send(AggregatorMessage::PollFailure {
                    source_id: source.id.clone(),
                    error: error.to_string(),
                    received_at: Utc::now(),
                });
                backoff.bump();
            }
        }

        let elapsed = started.elapsed();
        if elapsed > interval {
            warn!(source_id = %source.id, ?elapsed, ?interval, "poll overran its interval, proceeding immediately");
        }

        let wait = backoff.next_wait().saturating_sub(elapsed);
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown.changed() => break,
        }
    }

    info!(source_id = %source.id, "poller task stopped");
}

/// Owns one background task per configured source. Dropping a
/// `Scheduler` without calling [`Scheduler::shutdown`] simply detaches
/// its tasks; callers that care about a clean stop always shut down
/// explicitly.
pub struct Scheduler {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn spawn(
        sources: Vec<Source>,
        transport: Arc<SharedTransport>,
        mock_mode: bool,
        defaults: PollDefaults,
        aggregator_tx: mpsc::UnboundedSender<AggregatorMessage>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handles = sources
            .into_iter()
            .map(|source| {
                tokio::spawn(run_source(
                    source,
                    transport.clone(),
                    mock_mode,
                    defaults,
                    aggregator_tx.clone(),
                    shutdown_rx.clone(),
                ))
            })
            .collect();
        Self { shutdown_tx, handles }
    }

    /// Signals every poller task to stop and waits up to
    /// [`SHUTDOWN_DEADLINE`] for in-flight polls to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if tokio::time::timeout(SHUTDOWN_DEADLINE, futures::future::join_all(self.handles)).await.is_err() {
            warn!("poller shutdown deadline elapsed with tasks still running");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest::proptest! {
        /// The jittered wait is always between zero and the backoff
        /// ceiling, and the ceiling itself never exceeds `MAX_BACKOFF_WAIT`
        /// no matter how long the source's base poll interval is.
        #[test]
        fn next_wait_never_exceeds_absolute_ceiling(base_secs in 1u64..10_000, bumps in 0u32..20) {
            let mut backoff = BackoffState::new(Duration::from_secs(base_secs));
            for _ in 0..bumps {
                backoff.bump();
            }
            for _ in 0..20 {
                let wait = backoff.next_wait();
                proptest::prop_assert!(wait <= MAX_BACKOFF_WAIT);
            }
        }
    }

    #[test]
    fn backoff_grows_then_resets() {
        let mut backoff = BackoffState::new(Duration::from_millis(100));
        backoff.bump();
        assert!((backoff.multiplier - 1.5).abs() < f64::EPSILON);
        backoff.bump();
        backoff.bump();
        backoff.bump();
        backoff.bump();
        backoff.bump();
        backoff.bump();
        assert_eq!(backoff.multiplier, MAX_BACKOFF_MULTIPLIER);
        backoff.reset();
        assert_eq!(backoff.multiplier, 1.0);
    }

    #[tokio::test]
    async fn mock_client_snapshot_succeeds_without_network() {
        let client = build_client(
            &Source {
                id: "mock-1".into(),
                kind: SourceKind::Pve,
                name: "mock".into(),
                endpoint: "https://unused".into(),
                auth: pulse_domain::source::AuthKind::ApiToken { token_id: "x".into(), secret: "y".into() },
                tls_policy: pulse_domain::source::TlsPolicy::Verify,
                poll_interval_override: None,
            },
            Arc::new(SharedTransport::new()),
            true,
        );
        assert!(client.snapshot().await.is_ok());
    }

    #[tokio::test]
    async fn shutdown_stops_poller_tasks_promptly() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = Scheduler::spawn(
            vec![Source {
                id: "mock-1".into(),
                kind: SourceKind::Pve,
                name: "mock".into(),
                endpoint: "https://unused".into(),
                auth: pulse_domain::source::AuthKind::ApiToken { token_id: "x".into(), secret: "y".into() },
                tls_policy: pulse_domain::source::TlsPolicy::Verify,
                poll_interval_override: None,
            }],
            Arc::new(SharedTransport::new()),
            true,
            PollDefaults { pve: Duration::from_millis(20), pbs: Duration::from_millis(20) },
            tx,
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        let shutdown = tokio::time::timeout(Duration::from_secs(1), scheduler.shutdown()).await;
        assert!(shutdown.is_ok());

        let mut saw_success = false;
        while let Ok(message) = rx.try_recv() {
            if matches!(message, AggregatorMessage::PollSuccess { .. }) {
                saw_success = true;
            }
        }
        assert!(saw_success);
    }
}
