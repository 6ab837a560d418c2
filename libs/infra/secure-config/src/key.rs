// [libs/infra/secure-config/src/key.rs]
//! The AES-256 key file, stored with restricted permissions. Generated
//! on first boot, read on every subsequent one; never derived from a
//! passphrase, since there is no operator prompt in this service's
//! lifecycle for one.

use std::path::Path;

use aes_gcm::{Aes256Gcm, KeyInit};
use rand::RngCore;
use tracing::info;

use crate::errors::SecureConfigError;

pub const KEY_LENGTH_BYTES: usize = 32;

pub struct EncryptionKey(pub(crate) [u8; KEY_LENGTH_BYTES]);

impl EncryptionKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LENGTH_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new_from_slice(&self.0).expect("key is always the correct length")
    }

    /// Loads the key file at `path`, creating it with a fresh random key
    /// and restrictive permissions if it does not exist yet.
    pub async fn load_or_create(path: &Path) -> Result<Self, SecureConfigError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let mut key = [0u8; KEY_LENGTH_BYTES];
                if bytes.len() != KEY_LENGTH_BYTES {
                    return Err(SecureConfigError::Decryption);
                }
                key.copy_from_slice(&bytes);
                Ok(Self(key))
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no encryption key file found, generating one");
                let key = Self::generate();
                key.persist(path).await?;
                Ok(key)
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn persist(&self, path: &Path) -> Result<(), SecureConfigError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, self.0).await?;
        restrict_permissions(path).await?;
        Ok(())
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> Result<(), SecureConfigError> {
    use std::os::unix::fs::PermissionsExt;
    let permissions = std::fs::Permissions::from_mode(0o600);
    tokio::fs::set_permissions(path, permissions).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> Result<(), SecureConfigError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_key_file_on_first_load_and_reuses_it_after() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".encryption.key");

        let first = EncryptionKey::load_or_create(&path).await.unwrap();
        let second = EncryptionKey::load_or_create(&path).await.unwrap();

        assert_eq!(first.0, second.0);
    }
}
