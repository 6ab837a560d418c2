// [libs/shared/telemetry/src/lib.rs]
//! Tracing bootstrap shared by every Pulse binary and integration test.
//!
//! Development builds get compact, human-readable output; release builds
//! emit flattened JSON lines suitable for ingestion by a log shipper. A
//! global panic hook logs the panic through `tracing` before the default
//! hook runs, so a panic in a detached poller or worker task still leaves
//! a trace even though nothing printed to a terminal will be watched.

use std::panic;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global tracing subscriber for `service_name`.
///
/// Safe to call once per process; calling it twice panics, matching
/// `tracing`'s own global-subscriber contract.
pub fn init_tracing(service_name: &str) {
    let default_directive = format!(
        "{service_name}={level},tower_http=warn,hyper=warn,libsql=warn",
        level = if cfg!(debug_assertions) { "debug" } else { "info" }
    );
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directive.into());

    if cfg!(debug_assertions) {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact().with_target(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().flatten_event(true))
            .init();
    }

    install_panic_hook(service_name);
    tracing::info!(service = service_name, "tracing initialized");
}

fn install_panic_hook(service_name: &str) {
    let service_name = service_name.to_string();
    panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| info.payload().downcast_ref::<String>().map(String::as_str))
            .unwrap_or("<non-string panic payload>");

        tracing::error!(
            target: "panic",
            service = %service_name,
            location = %location,
            "panic: {payload}"
        );
    }));
}
