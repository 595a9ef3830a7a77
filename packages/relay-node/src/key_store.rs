//! Persisted relay signing key, optionally encrypted with AES-256-GCM.
//!
//! A single file under the configured keystore directory. Created on first
//! start, reused afterwards.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use alloy::primitives::{Address, B256};
use alloy::signers::local::PrivateKeySigner;
use std::path::{Path, PathBuf};
use tracing::info;

const KEY_FILE: &str = "relay-key.json";

/// Associated data bound into every sealed key file.
const KEY_FILE_AAD: &[u8] = b"relay-node/signing-key/v1";

const NONCE_LEN: usize = 12;

/// Key store: encrypted (AES-256-GCM) for production, plaintext for dev.
pub struct KeyStore {
    path: PathBuf,
    cipher: Option<KeyCipher>,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct StoredKey {
    address: Address,
    secret_key: B256,
}

impl KeyStore {
    pub fn new_plaintext(dir: &Path) -> Self {
        Self {
            path: dir.join(KEY_FILE),
            cipher: None,
        }
    }

    pub fn new_encrypted(dir: &Path, key_b64: &str) -> Result<Self, crate::Error> {
        let key_bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, key_b64)
            .map_err(|e| crate::Error::Config(format!("Invalid encryption key base64: {e}")))?;

        if key_bytes.len() != 32 {
            return Err(crate::Error::Config(format!(
                "Encryption key must be 32 bytes, got {}",
                key_bytes.len()
            )));
        }

        Ok(Self {
            path: dir.join(KEY_FILE),
            cipher: Some(KeyCipher::new(&key_bytes)?),
        })
    }

    /// Plaintext or encrypted depending on whether a key is configured.
    pub fn from_config(config: &crate::Config) -> Result<Self, crate::Error> {
        let dir = config.keystore_dir();
        match config.keystore_encryption_key.as_deref() {
            Some(key) if !key.is_empty() => Self::new_encrypted(&dir, key),
            _ => Ok(Self::new_plaintext(&dir)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the signing key, generating and persisting one if none exists.
    pub fn load_or_create(&self) -> Result<PrivateKeySigner, crate::Error> {
        if let Some(signer) = self.load()? {
            return Ok(signer);
        }

        let signer = generate_signer()?;
        self.save(&signer)?;
        info!(address = %signer.address(), path = %self.path.display(), "Generated new relay key");
        Ok(signer)
    }

    pub fn load(&self) -> Result<Option<PrivateKeySigner>, crate::Error> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "No key file found");
            return Ok(None);
        }

        let data = std::fs::read(&self.path)
            .map_err(|e| crate::Error::KeyStore(format!("Failed to read key file: {e}")))?;

        let json_bytes = if let Some(cipher) = &self.cipher {
            cipher.open(&data)?
        } else {
            data
        };

        let stored: StoredKey = serde_json::from_slice(&json_bytes)
            .map_err(|e| crate::Error::KeyStore(format!("Failed to parse key file: {e}")))?;

        let signer = PrivateKeySigner::from_bytes(&stored.secret_key)
            .map_err(|e| crate::Error::KeyStore(format!("Invalid secret key: {e}")))?;

        if signer.address() != stored.address {
            return Err(crate::Error::KeyStore(format!(
                "Key file address {} does not match its secret key",
                stored.address
            )));
        }

        info!(address = %signer.address(), path = %self.path.display(), "Relay key loaded");
        Ok(Some(signer))
    }

    pub fn save(&self, signer: &PrivateKeySigner) -> Result<(), crate::Error> {
        let stored = StoredKey {
            address: signer.address(),
            secret_key: signer.to_bytes(),
        };

        let json = serde_json::to_string_pretty(&stored)
            .map_err(|e| crate::Error::KeyStore(format!("Failed to serialize key: {e}")))?;

        let data = if let Some(cipher) = &self.cipher {
            cipher.seal(json.as_bytes())?
        } else {
            json.into_bytes()
        };

        // Atomic write: tmp + rename
        let tmp = self.path.with_extension("tmp");
        if let Some(parent) = tmp.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                crate::Error::KeyStore(format!("Failed to create keystore directory: {e}"))
            })?;
        }
        std::fs::write(&tmp, &data)
            .map_err(|e| crate::Error::KeyStore(format!("Failed to write key file: {e}")))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| crate::Error::KeyStore(format!("Failed to rename key file: {e}")))?;

        Ok(())
    }
}

fn generate_signer() -> Result<PrivateKeySigner, crate::Error> {
    use rand::RngCore;

    // A random 32-byte value is a valid secp256k1 scalar with overwhelming
    // probability; retry the rare miss.
    for _ in 0..8 {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        if let Ok(signer) = PrivateKeySigner::from_bytes(&B256::from(bytes)) {
            return Ok(signer);
        }
    }
    Err(crate::Error::KeyStore("Failed to generate a valid key".into()))
}

/// AES-256-GCM over the key file. Sealed layout is `nonce || ciphertext`.
struct KeyCipher(Aes256Gcm);

impl KeyCipher {
    fn new(key: &[u8]) -> Result<Self, crate::Error> {
        Aes256Gcm::new_from_slice(key)
            .map(Self)
            .map_err(|e| crate::Error::Config(format!("Invalid encryption key: {e}")))
    }

    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, crate::Error> {
        use rand::RngCore;

        let mut nonce = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce);
        let payload = Payload {
            msg: plaintext,
            aad: KEY_FILE_AAD,
        };
        let ciphertext = self
            .0
            .encrypt(Nonce::from_slice(&nonce), payload)
            .map_err(|e| crate::Error::KeyStore(format!("Failed to encrypt relay key: {e}")))?;

        Ok([nonce.as_slice(), ciphertext.as_slice()].concat())
    }

    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, crate::Error> {
        if sealed.len() < NONCE_LEN {
            return Err(crate::Error::KeyStore(format!(
                "Encrypted key file is {} bytes, shorter than its nonce",
                sealed.len()
            )));
        }
        let (nonce, msg) = sealed.split_at(NONCE_LEN);
        let payload = Payload {
            msg,
            aad: KEY_FILE_AAD,
        };
        self.0.decrypt(Nonce::from_slice(nonce), payload).map_err(|_| {
            crate::Error::KeyStore("Cannot decrypt relay key: wrong key or tampered file".into())
        })
    }
}
