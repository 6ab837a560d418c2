// [libs/infra/notify-transports/src/errors.rs]
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    /// Dial failure, timeout, or other condition the queue should retry.
    #[error("transient delivery failure: {0}")]
    Transient(String),

    /// Bad credentials, malformed config, or a rejection the queue should
    /// not keep retrying (still subject to the configured attempt cap).
    #[error("permanent delivery failure: {0}")]
    Permanent(String),

    /// The destination resolved to a loopback, link-local, RFC1918, or
    /// cloud-metadata address. Always permanent.
    #[error("destination address is blocked: {0}")]
    BlockedAddress(String),
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Transient(_))
    }
}
