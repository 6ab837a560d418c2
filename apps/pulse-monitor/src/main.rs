// [apps/pulse-monitor/src/main.rs]
//! Process entry point: loads config, bootstraps every long-lived
//! component, serves the HTTP/WebSocket surface, and shuts everything
//! down cooperatively on SIGINT/SIGTERM.

use std::sync::Arc;

use pulse_broadcast::BroadcastHub;
use pulse_domain::alert::AlertRule;
use pulse_domain::source::Source;
use pulse_metrics_ring::MetricsRing;
use pulse_monitor::aggregator::Aggregator;
use pulse_monitor::alerting::{AlertEvaluator, NotificationChannels, NotificationWorkerPool};
use pulse_monitor::config::AppConfig;
use pulse_monitor::scheduler::{PollDefaults, Scheduler};
use pulse_monitor::state::AppState;
use pulse_notify_store::{NotificationRepository, NotifyStoreClient};
use pulse_secure_config::EncryptionKey;
use pulse_source_client::SharedTransport;
use tokio::sync::mpsc;
use tracing::info;

const RUNTIME_THREAD_STACK_SIZE: usize = 4 * 1024 * 1024;

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    pulse_telemetry::init_tracing("pulse-monitor");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_stack_size(RUNTIME_THREAD_STACK_SIZE)
        .build()?;

    runtime.block_on(run())
}

async fn run() -> anyhow::Result<()> {
    let config = Arc::new(AppConfig::from_env());
    tokio::fs::create_dir_all(&config.data_dir).await?;

    let encryption_key = Arc::new(EncryptionKey::load_or_create(&config.encryption_key_file()).await?);

    let sources: Vec<Source> = pulse_secure_config::load_or_default(&config.sources_file(), &encryption_key).await?;
    let alert_rules: Vec<AlertRule> = pulse_secure_config::load_or_default(&config.alert_rules_file(), &encryption_key).await?;
    info!(sources = sources.len(), rules = alert_rules.len(), "loaded configuration");

    let notify_client = NotifyStoreClient::connect(&config.notifications_db_path().to_string_lossy(), None).await?;
    let notifications = Arc::new(NotificationRepository::new(notify_client));

    let hub = BroadcastHub::new();
    let metrics_ring = Arc::new(MetricsRing::new());

    let (alert_state_tx, alert_state_rx) = mpsc::unbounded_channel();
    let (aggregator, cluster_state) = Aggregator::new(hub.clone(), metrics_ring.clone(), alert_state_tx, config.full_snapshot_every_n_deltas);
    let (aggregator_tx, aggregator_rx) = mpsc::unbounded_channel();
    tokio::spawn(aggregator.run(aggregator_rx));

    let transport = Arc::new(SharedTransport::new());
    let scheduler = Scheduler::spawn(
        sources,
        transport,
        config.mock_mode,
        PollDefaults { pve: config.default_pve_poll_interval, pbs: config.default_pbs_poll_interval },
        aggregator_tx.clone(),
    );

    let (alert_shutdown_tx, alert_shutdown_rx) = tokio::sync::watch::channel(false);
    let evaluator = AlertEvaluator::new(alert_rules);
    let channels = NotificationChannels::default();
    let alert_loop = tokio::spawn(pulse_monitor::alerting::run_alert_loop(
        evaluator,
        notifications.clone(),
        channels,
        alert_state_rx,
        aggregator_tx.clone(),
        alert_shutdown_rx,
    ));

    let workers = NotificationWorkerPool::spawn(config.notification_worker_count, notifications.clone());

    let application_state = AppState {
        cluster_state,
        hub,
        metrics_ring,
        notifications,
        aggregator_tx,
        config: config.clone(),
        encryption_key,
    };
    let router = pulse_monitor::routes::build_router(application_state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.listen_port)).await?;
    info!(port = config.listen_port, "pulse-monitor listening");

    let server = axum::serve(listener, router).with_graceful_shutdown(shutdown_signal());
    server.await?;

    info!("shutting down background tasks");
    scheduler.shutdown().await;
    let _ = alert_shutdown_tx.send(true);
    let _ = tokio::time::timeout(pulse_monitor::scheduler::SHUTDOWN_DEADLINE, alert_loop).await;
    workers.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
