// [libs/infra/notify-transports/src/webhook.rs]
//! Webhook transport: templated HTTP POST, per-URL rate limiting,
//! and dual-stage SSRF protection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pulse_source_client::rate_limit::TokenBucket;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{instrument, warn};

use crate::errors::TransportError;
use crate::redact::redact_url;
use crate::ssrf::{validate_at_configure_time, BlockListedResolver};
use crate::template;

const DEFAULT_PER_URL_RATE_PER_MINUTE: f64 = 10.0;
const SEND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    /// Selects a known-service body/header template; `None` uses `body_template` verbatim.
    pub service: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub body_template: String,
}

pub struct WebhookTransport {
    client: Client,
    rate_limiters: Mutex<HashMap<String, Arc<TokenBucket>>>,
}

impl WebhookTransport {
    pub fn new() -> Self {
        let client = Client::builder()
            .dns_resolver(Arc::new(BlockListedResolver))
            .timeout(SEND_TIMEOUT)
            .user_agent("pulse-monitor/webhook-transport")
            .build()
            .expect("default TLS + resolver configuration is always valid");

        Self { client, rate_limiters: Mutex::new(HashMap::new()) }
    }

    #[instrument(skip(self, config, context), fields(url = %redact_url(&config.url)))]
    pub async fn send(&self, config: &WebhookConfig, context: &Value) -> Result<(), TransportError> {
        validate_at_configure_time(&config.url)
            .await
            .map_err(|error| TransportError::BlockedAddress(error.to_string()))?;

        self.rate_limiter_for(&config.url).acquire().await;

        let body = render_body(config, context);
        let mut request = self.client.post(&config.url).body(body);
        for (name, value) in &config.headers {
            let rendered_value = template::render(value, context);
            request = request.header(name, rendered_value);
        }

        let response = request.send().await.map_err(|error| {
            if error.is_timeout() || error.is_connect() {
                TransportError::Transient(error.to_string())
            } else {
                TransportError::Permanent(error.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status.is_server_error() || status.as_u16() == 429 {
            Err(TransportError::Transient(format!("HTTP {status}")))
        } else {
            warn!(%status, url = %redact_url(&config.url), "webhook rejected the request");
            Err(TransportError::Permanent(format!("HTTP {status}")))
        }
    }

    fn rate_limiter_for(&self, url: &str) -> Arc<TokenBucket> {
        let mut limiters = self.rate_limiters.lock().expect("rate limiter map mutex poisoned");
        limiters
            .entry(url.to_string())
            .or_insert_with(|| Arc::new(TokenBucket::new(DEFAULT_PER_URL_RATE_PER_MINUTE, DEFAULT_PER_URL_RATE_PER_MINUTE / 60.0)))
            .clone()
    }
}

impl Default for WebhookTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn render_body(config: &WebhookConfig, context: &Value) -> String {
    match config.service.as_deref() {
        Some("slack") => template::render(r#"{"text": "{{alert.level|upper}}: {{alert.summary}}"}"#, context),
        Some("discord") => template::render(r#"{"content": "{{alert.level|upper}}: {{alert.summary}}"}"#, context),
        _ => template::render(&config.body_template, context),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_service_template_overrides_raw_body() {
        let config = WebhookConfig {
            url: "https://hooks.example.com/x".into(),
            service: Some("slack".into()),
            headers: HashMap::new(),
            body_template: "ignored".into(),
        };
        let context = serde_json::json!({ "alert": { "level": "critical", "summary": "CPU over threshold" } });
        let body = render_body(&config, &context);
        assert!(body.contains("CRITICAL"));
        assert!(body.contains("CPU over threshold"));
    }
}
