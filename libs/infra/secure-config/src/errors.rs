// [libs/infra/secure-config/src/errors.rs]
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SecureConfigError {
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decryption failed: ciphertext tampered or wrong key")]
    Decryption,

    #[error("encoding error: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("failed to (de)serialize config: {0}")]
    Mapping(#[from] serde_json::Error),
}

impl SecureConfigError {
    /// True when the failure was simply "the file doesn't exist yet" —
    /// the expected state on first run, distinct from a real I/O fault,
    /// a tampered/wrong-key ciphertext, or a malformed file.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SecureConfigError::Io(io) if io.kind() == std::io::ErrorKind::NotFound)
    }
}
