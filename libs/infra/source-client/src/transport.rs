// [libs/infra/source-client/src/transport.rs]
//! A single shared transport reused across every source: one transport
//! instance is shared across all sources, but per-host connection pools
//! are isolated. `reqwest::Client` already pools
//! connections per host internally, so sharing one `Client` satisfies
//! that isolation for free; the only thing that needs per-source
//! selection is TLS verification, which `reqwest` only configures at the
//! client level. We therefore keep exactly two clients — one verifying,
//! one not — and every source picks between them by its own
//! `TlsPolicy`, never affecting any other source's verification.

use std::time::Duration;

use pulse_domain::source::TlsPolicy;
use reqwest::Client;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct SharedTransport {
    verifying: Client,
    skip_verify: Client,
}

impl SharedTransport {
    pub fn new() -> Self {
        let verifying = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .user_agent("pulse-monitor/source-client")
            .build()
            .expect("default TLS client configuration is always valid");

        let skip_verify = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .user_agent("pulse-monitor/source-client")
            .danger_accept_invalid_certs(true)
            .build()
            .expect("insecure TLS client configuration is always valid");

        Self { verifying, skip_verify }
    }

    pub fn client_for(&self, policy: TlsPolicy) -> &Client {
        match policy {
            TlsPolicy::Verify => &self.verifying,
            TlsPolicy::SkipVerify => &self.skip_verify,
        }
    }
}

impl Default for SharedTransport {
    fn default() -> Self {
        Self::new()
    }
}
