// [libs/infra/secure-config/src/lib.rs]
//! Encryption at rest for source credentials, alert rule definitions,
//! and transport configs, with transparent migration of files written
//! before this crate existed.

pub mod cipher;
pub mod errors;
pub mod key;
pub mod migration;

pub use cipher::EncryptedBlob;
pub use errors::SecureConfigError;
pub use key::EncryptionKey;
pub use migration::{load, load_or_default, save};
