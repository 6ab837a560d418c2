// [libs/infra/notify-transports/src/email.rs]
//! Email transport: SMTP with STARTTLS or implicit TLS, rendering
//! both HTML and plain-text parts, rate-limited per minute.

use std::time::Duration;

use lettre::message::{MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use pulse_source_client::rate_limit::TokenBucket;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use crate::errors::TransportError;
use crate::template;

const DEFAULT_PER_MINUTE_RATE: f64 = 60.0;
const DIAL_TIMEOUT: Duration = Duration::from_secs(10);
const TOTAL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    /// `true` selects implicit TLS (SMTPS); `false` selects STARTTLS.
    pub implicit_tls: bool,
    pub username: String,
    pub password: String,
    pub from: String,
    pub to: Vec<String>,
    pub subject_template: String,
    pub html_body_template: String,
    pub text_body_template: String,
}

pub struct EmailTransport {
    rate_limiter: TokenBucket,
}

impl EmailTransport {
    pub fn new() -> Self {
        Self { rate_limiter: TokenBucket::new(DEFAULT_PER_MINUTE_RATE, DEFAULT_PER_MINUTE_RATE / 60.0) }
    }

    #[instrument(skip(self, config, context), fields(host = %config.smtp_host))]
    pub async fn send(&self, config: &EmailConfig, context: &Value) -> Result<(), TransportError> {
        self.rate_limiter.acquire().await;

        let transport = self.build_transport(config)?;

        let subject = template::render(&config.subject_template, context);
        let html_body = template::render(&config.html_body_template, context);
        let text_body = template::render(&config.text_body_template, context);

        let mut builder = Message::builder()
            .from(config.from.parse().map_err(|error| TransportError::Permanent(format!("invalid from address: {error}")))?)
            .subject(subject);

        for recipient in &config.to {
            builder = builder
                .to(recipient.parse().map_err(|error| TransportError::Permanent(format!("invalid recipient: {error}")))?);
        }

        let message = builder
            .multipart(
                MultiPart::alternative()
                    .singlepart(SinglePart::plain(text_body))
                    .singlepart(SinglePart::html(html_body)),
            )
            .map_err(|error| TransportError::Permanent(format!("failed to build message: {error}")))?;

        transport.send(message).await.map_err(|error| classify_smtp_error(&error))?;
        Ok(())
    }

    fn build_transport(&self, config: &EmailConfig) -> Result<AsyncSmtpTransport<Tokio1Executor>, TransportError> {
        let credentials = Credentials::new(config.username.clone(), config.password.clone());

        let builder = if config.implicit_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
        }
        .map_err(|error| TransportError::Permanent(format!("SMTP relay configuration invalid: {error}")))?;

        Ok(builder
            .port(config.smtp_port)
            .credentials(credentials)
            .timeout(Some(TOTAL_TIMEOUT))
            .build())
    }
}

impl Default for EmailTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn classify_smtp_error(error: &lettre::transport::smtp::Error) -> TransportError {
    if error.is_permanent() {
        TransportError::Permanent(error.to_string())
    } else if error.is_client() || error.is_tls() {
        TransportError::Permanent(error.to_string())
    } else {
        TransportError::Transient(error.to_string())
    }
}

/// `DIAL_TIMEOUT` governs the initial TCP connect before the SMTP
/// handshake begins; lettre's own `timeout()` covers the transaction as
/// a whole, so this constant exists to document the 10s dial / 30s
/// transaction split even though lettre does not expose the two
/// independently.
#[allow(dead_code)]
const _: Duration = DIAL_TIMEOUT;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_subject_and_bodies_from_template() {
        let context = serde_json::json!({ "alert": { "level": "critical", "summary": "disk full" } });
        let subject = template::render("[{{alert.level|upper}}] {{alert.summary}}", &context);
        assert_eq!(subject, "[CRITICAL] disk full");
    }
}
