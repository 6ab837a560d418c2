// [libs/infra/notify-transports/src/apprise.rs]
//! Apprise transport: either shells out to a local `apprise` CLI
//! binary, or POSTs to an Apprise HTTP server. The HTTP mode reuses the
//! same SSRF-protected client as the webhook transport.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::instrument;

use crate::errors::TransportError;
use crate::ssrf::{validate_at_configure_time, BlockListedResolver};
use crate::template;

const CLI_TIMEOUT: Duration = Duration::from_secs(30);
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AppriseMode {
    Cli { binary_path: String },
    Http { server_url: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppriseConfig {
    pub mode: AppriseMode,
    pub targets: Vec<String>,
    pub title_template: String,
    pub body_template: String,
}

pub struct AppriseTransport {
    http_client: Client,
}

impl AppriseTransport {
    pub fn new() -> Self {
        let http_client = Client::builder()
            .dns_resolver(Arc::new(BlockListedResolver))
            .timeout(HTTP_TIMEOUT)
            .user_agent("pulse-monitor/apprise-transport")
            .build()
            .expect("default TLS + resolver configuration is always valid");

        Self { http_client }
    }

    #[instrument(skip(self, config, context))]
    pub async fn send(&self, config: &AppriseConfig, context: &Value) -> Result<(), TransportError> {
        let title = template::render(&config.title_template, context);
        let body = template::render(&config.body_template, context);

        match &config.mode {
            AppriseMode::Cli { binary_path } => self.send_via_cli(binary_path, &config.targets, &title, &body).await,
            AppriseMode::Http { server_url } => self.send_via_http(server_url, &config.targets, &title, &body).await,
        }
    }

    async fn send_via_cli(&self, binary_path: &str, targets: &[String], title: &str, body: &str) -> Result<(), TransportError> {
        let mut command = Command::new(binary_path);
        command.arg("-t").arg(title).arg("-b").arg(body).stdout(Stdio::null()).stderr(Stdio::piped());
        for target in targets {
            command.arg(target);
        }

        // Applied to the whole invocation rather than per target, since a
        // single `apprise` process call already fans out to every target
        // internally.
        let output = timeout(CLI_TIMEOUT, command.output())
            .await
            .map_err(|_| TransportError::Transient("apprise CLI invocation timed out".into()))?
            .map_err(|error| TransportError::Transient(format!("failed to spawn apprise CLI: {error}")))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            Err(TransportError::Permanent(format!("apprise CLI exited with {}: {stderr}", output.status)))
        }
    }

    async fn send_via_http(&self, server_url: &str, targets: &[String], title: &str, body: &str) -> Result<(), TransportError> {
        validate_at_configure_time(server_url)
            .await
            .map_err(|error| TransportError::BlockedAddress(error.to_string()))?;

        let payload = serde_json::json!({
            "urls": targets.join(","),
            "title": title,
            "body": body,
        });

        let response = self
            .http_client
            .post(server_url)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() || error.is_connect() {
                    TransportError::Transient(error.to_string())
                } else {
                    TransportError::Permanent(error.to_string())
                }
            })?;

        if response.status().is_success() {
            Ok(())
        } else if response.status().is_server_error() {
            Err(TransportError::Transient(format!("HTTP {}", response.status())))
        } else {
            Err(TransportError::Permanent(format!("HTTP {}", response.status())))
        }
    }
}

impl Default for AppriseTransport {
    fn default() -> Self {
        Self::new()
    }
}
