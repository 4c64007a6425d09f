use crate::constants::buffers::{CRYPTO_IV_SIZE, CRYPTO_KEY_SIZE, CRYPTO_TAG_SIZE};
use crate::errors::EngineError;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::Aes256Gcm;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Accepts 64 hex chars, 32 raw bytes or base64; any other passphrase is hashed to a key.
fn decode_key(raw: &str) -> Vec<u8> {
    let trimmed = raw.trim();
    if trimmed.len() == CRYPTO_KEY_SIZE * 2 {
        if let Ok(bytes) = hex::decode(trimmed) {
            return bytes;
        }
    }
    if trimmed.len() == CRYPTO_KEY_SIZE {
        return trimmed.as_bytes().to_vec();
    }
    if let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(trimmed.as_bytes()) {
        if bytes.len() == CRYPTO_KEY_SIZE {
            return bytes;
        }
    }
    Sha256::digest(trimmed.as_bytes()).to_vec()
}

/// AES-256-GCM encryption for credential values at rest.
#[derive(Clone)]
pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl SecretCipher {
    pub fn from_key(raw: &str) -> Self {
        let secret_key = decode_key(raw);
        let key = aes_gcm::Key::<Aes256Gcm>::from_slice(&secret_key);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// Uses `key_material` when present, otherwise loads (or creates) the key file.
    pub fn load(key_material: Option<&str>, key_path: &Path) -> Result<Self, EngineError> {
        if let Some(raw) = key_material.filter(|raw| !raw.trim().is_empty()) {
            return Ok(Self::from_key(raw));
        }
        let stored = Self::load_or_create_key_file(key_path)?;
        Ok(Self::from_key(&stored))
    }

    fn load_or_create_key_file(path: &Path) -> Result<String, EngineError> {
        if path.exists() {
            let stored = fs::read_to_string(path)?;
            if !stored.trim().is_empty() {
                return Ok(stored.trim().to_string());
            }
        }

        let mut generated = vec![0u8; CRYPTO_KEY_SIZE];
        OsRng.fill_bytes(&mut generated);
        let encoded = hex::encode(&generated);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = file.set_permissions(fs::Permissions::from_mode(0o600));
        }
        file.write_all(encoded.as_bytes())?;
        Ok(encoded)
    }

    pub fn encrypt(&self, text: &str) -> Result<String, EngineError> {
        let mut iv = [0u8; CRYPTO_IV_SIZE];
        OsRng.fill_bytes(&mut iv);
        let nonce = aes_gcm::Nonce::from_slice(&iv);
        let mut ciphertext = self
            .cipher
            .encrypt(nonce, text.as_bytes())
            .map_err(|_| EngineError::internal("Failed to encrypt credential value"))?;
        if ciphertext.len() < CRYPTO_TAG_SIZE {
            return Err(EngineError::internal("Failed to encrypt credential value"));
        }
        let tag = ciphertext.split_off(ciphertext.len() - CRYPTO_TAG_SIZE);
        Ok(format!(
            "{}:{}:{}",
            hex::encode(iv),
            hex::encode(tag),
            hex::encode(ciphertext)
        ))
    }

    pub fn decrypt(&self, payload: &str) -> Result<String, EngineError> {
        let malformed = || {
            EngineError::internal("Stored credential value is not in encrypted format")
                .with_hint("Expected format: \"<iv_hex>:<tag_hex>:<data_hex>\".")
        };
        let parts: Vec<&str> = payload.split(':').collect();
        if parts.len() != 3 {
            return Err(malformed());
        }
        let iv = hex::decode(parts[0]).map_err(|_| malformed())?;
        let tag = hex::decode(parts[1]).map_err(|_| malformed())?;
        let data = hex::decode(parts[2]).map_err(|_| malformed())?;
        if iv.len() != CRYPTO_IV_SIZE || tag.len() != CRYPTO_TAG_SIZE {
            return Err(malformed());
        }
        let mut combined = Vec::with_capacity(data.len() + tag.len());
        combined.extend_from_slice(&data);
        combined.extend_from_slice(&tag);
        let nonce = aes_gcm::Nonce::from_slice(&iv);
        let decrypted = self
            .cipher
            .decrypt(nonce, combined.as_ref())
            .map_err(|_| {
                EngineError::internal("Failed to decrypt credential value").with_hint(
                    "Ensure APIRUNNER_ENCRYPTION_KEY (or the key file) matches the key used when the credential was stored.",
                )
            })?;
        Ok(String::from_utf8_lossy(&decrypted).to_string())
    }
}
