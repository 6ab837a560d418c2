// [libs/infra/secure-config/src/cipher.rs]
//! Envelope format for an encrypted config file: a random 96-bit nonce
//! plus the AES-256-GCM ciphertext, both base64-encoded so the file
//! stays a single JSON document regardless of which config it carries.

use aes_gcm::aead::Aead;
use aes_gcm::Nonce;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::errors::SecureConfigError;
use crate::key::EncryptionKey;

const NONCE_LENGTH_BYTES: usize = 12;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedBlob {
    pub nonce_base64: String,
    pub ciphertext_base64: String,
}

pub fn encrypt(key: &EncryptionKey, plaintext: &[u8]) -> Result<EncryptedBlob, SecureConfigError> {
    let mut nonce_bytes = [0u8; NONCE_LENGTH_BYTES];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = key.cipher().encrypt(nonce, plaintext).map_err(|_| SecureConfigError::Decryption)?;

    Ok(EncryptedBlob {
        nonce_base64: BASE64.encode(nonce_bytes),
        ciphertext_base64: BASE64.encode(ciphertext),
    })
}

pub fn decrypt(key: &EncryptionKey, blob: &EncryptedBlob) -> Result<Vec<u8>, SecureConfigError> {
    let nonce_bytes = BASE64.decode(&blob.nonce_base64)?;
    let ciphertext = BASE64.decode(&blob.ciphertext_base64)?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    key.cipher().decrypt(nonce, ciphertext.as_ref()).map_err(|_| SecureConfigError::Decryption)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let key = EncryptionKey::generate();
        let blob = encrypt(&key, b"super secret token").unwrap();
        let recovered = decrypt(&key, &blob).unwrap();
        assert_eq!(recovered, b"super secret token");
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let key = EncryptionKey::generate();
        let other_key = EncryptionKey::generate();
        let blob = encrypt(&key, b"super secret token").unwrap();
        assert!(decrypt(&other_key, &blob).is_err());
    }
}
