// [libs/infra/secure-config/src/migration.rs]
//! Transparent upgrade path for config files written before encryption
//! at rest existed: a legacy file is plain JSON; a current file is a
//! JSON-encoded [`EncryptedBlob`]. `load` tells them apart by trying a
//! plaintext parse first, and rewrites legacy files as encrypted on
//! the spot so the migration only ever happens once per file.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, instrument};

use crate::cipher::{self, EncryptedBlob};
use crate::errors::SecureConfigError;
use crate::key::EncryptionKey;

#[instrument(skip(key), fields(path = %path.display()))]
pub async fn load<T>(path: &Path, key: &EncryptionKey) -> Result<T, SecureConfigError>
where
    T: DeserializeOwned + Serialize,
{
    let raw = tokio::fs::read(path).await?;

    if let Ok(value) = serde_json::from_slice::<T>(&raw) {
        info!("legacy plaintext config detected, migrating to encrypted storage");
        save(path, key, &value).await?;
        return Ok(value);
    }

    let blob: EncryptedBlob = serde_json::from_slice(&raw)?;
    let plaintext = cipher::decrypt(key, &blob)?;
    Ok(serde_json::from_slice(&plaintext)?)
}

/// Like [`load`], but a missing file (the expected state on first run)
/// resolves to `T::default()` instead of an error. Any other failure —
/// a real I/O fault, a tampered or wrong-key ciphertext, a malformed
/// file — is still propagated; callers must not treat those the same
/// as "nothing configured yet".
pub async fn load_or_default<T>(path: &Path, key: &EncryptionKey) -> Result<T, SecureConfigError>
where
    T: DeserializeOwned + Serialize + Default,
{
    match load(path, key).await {
        Ok(value) => Ok(value),
        Err(error) if error.is_not_found() => Ok(T::default()),
        Err(error) => Err(error),
    }
}

#[instrument(skip(key, value), fields(path = %path.display()))]
pub async fn save<T>(path: &Path, key: &EncryptionKey, value: &T) -> Result<(), SecureConfigError>
where
    T: Serialize,
{
    let plaintext = serde_json::to_vec(value)?;
    let blob = cipher::encrypt(key, &plaintext)?;
    let encoded = serde_json::to_vec(&blob)?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, encoded).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct SampleConfig {
        host: String,
        port: u16,
    }

    #[tokio::test]
    async fn migrates_legacy_plaintext_file_and_rewrites_it_encrypted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source.json");
        let key = EncryptionKey::generate();

        let original = SampleConfig { host: "pve.example.com".into(), port: 8006 };
        tokio::fs::write(&path, serde_json::to_vec(&original).unwrap()).await.unwrap();

        let loaded: SampleConfig = load(&path, &key).await.unwrap();
        assert_eq!(loaded, original);

        let raw = tokio::fs::read(&path).await.unwrap();
        assert!(serde_json::from_slice::<SampleConfig>(&raw).is_err());
        assert!(serde_json::from_slice::<EncryptedBlob>(&raw).is_ok());
    }

    #[tokio::test]
    async fn round_trips_through_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source.json");
        let key = EncryptionKey::generate();

        let value = SampleConfig { host: "pbs.example.com".into(), port: 8007 };
        save(&path, &key, &value).await.unwrap();

        let loaded: SampleConfig = load(&path, &key).await.unwrap();
        assert_eq!(loaded, value);
    }

    #[tokio::test]
    async fn wrong_key_fails_to_load_encrypted_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source.json");
        let key = EncryptionKey::generate();
        let other_key = EncryptionKey::generate();

        let value = SampleConfig { host: "pbs.example.com".into(), port: 8007 };
        save(&path, &key, &value).await.unwrap();

        let result: Result<SampleConfig, SecureConfigError> = load(&path, &other_key).await;
        assert!(result.is_err());
    }
}
