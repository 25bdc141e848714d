//! Symmetric encryption for data at rest.
//!
//! [`EncryptionManager`] wraps AES-256-GCM behind a string-in, string-out API
//! so storage backends only ever see opaque base64 text:
//!
//! - a fresh 96-bit nonce per call
//! - a versioned JSON envelope ([`EncryptedData`]) carrying nonce, ciphertext
//!   and algorithm, base64-encoded as a whole
//! - text or JSON payloads ([`Payload`])
//! - Argon2 password-based key derivation
//!
//! ## Usage
//!
//! ```rust
//! use serde_json::json;
//! use tunelink_common::crypto::{EncryptionManager, Payload};
//!
//! let manager = EncryptionManager::new(&EncryptionManager::generate_key())?;
//!
//! let sealed = manager.encrypt(&Payload::Structured(json!({"scope": "read"})))?;
//! let opened = manager.decrypt(&sealed, true)?;
//! assert_eq!(opened, Payload::Structured(json!({"scope": "read"})));
//! # Ok::<(), tunelink_common::error::CommonError>(())
//! ```

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::password_hash::rand_core::{OsRng, RngCore};
use argon2::Argon2;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CommonError, CommonResult};

const ALGORITHM: &str = "AES-256-GCM";
const ENVELOPE_VERSION: u8 = 1;
const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Serialized envelope around one ciphertext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedData {
    pub version: u8,
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub algorithm: String,
}

/// Plaintext accepted by [`EncryptionManager::encrypt`].
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Structured(serde_json::Value),
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Self::Structured(value)
    }
}

/// AES-256-GCM encryption manager keyed by a single 32-byte key.
pub struct EncryptionManager {
    key: Vec<u8>,
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for EncryptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionManager")
            .field("key", &"[REDACTED]")
            .field("fingerprint", &self.key_fingerprint())
            .finish()
    }
}

impl EncryptionManager {
    /// Create a manager from a standard-base64 key that decodes to 32 bytes.
    ///
    /// # Errors
    /// Returns `CommonError::Crypto` when the key is not valid base64 or has
    /// the wrong length.
    pub fn new(key_b64: &str) -> CommonResult<Self> {
        let key = BASE64
            .decode(key_b64.trim())
            .map_err(|_| CommonError::crypto("load_key", "Encryption key is not valid base64"))?;
        Self::from_key_bytes(key)
    }

    /// Create a manager from a raw 32-byte key.
    pub fn from_key_bytes(key: Vec<u8>) -> CommonResult<Self> {
        if key.len() != KEY_LEN {
            return Err(CommonError::crypto(
                "load_key",
                format!("Encryption key must be exactly {KEY_LEN} bytes, got {}", key.len()),
            ));
        }

        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|e| {
            CommonError::crypto("load_key", format!("Failed to create encryption cipher: {e}"))
        })?;

        Ok(Self { key, cipher })
    }

    /// Generate a random 32-byte key, standard base64 encoded.
    pub fn generate_key() -> String {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        BASE64.encode(key)
    }

    /// Derive a base64 key from a password and caller-provided salt with
    /// Argon2 (default parameters).
    ///
    /// # Errors
    /// Returns `CommonError::Crypto` when the salt is shorter than 8 bytes.
    pub fn derive_key_from_password(password: &str, salt: &str) -> CommonResult<String> {
        let mut key = [0u8; KEY_LEN];
        Argon2::default()
            .hash_password_into(password.as_bytes(), salt.as_bytes(), &mut key)
            .map_err(|e| CommonError::crypto("derive_key", format!("Key derivation failed: {e}")))?;
        Ok(BASE64.encode(key))
    }

    /// Encrypt a payload into an opaque base64 string.
    pub fn encrypt(&self, payload: &Payload) -> CommonResult<String> {
        let plaintext = match payload {
            Payload::Text(text) => text.clone().into_bytes(),
            Payload::Structured(value) => serde_json::to_vec(value).map_err(|e| {
                CommonError::crypto("encrypt", format!("Failed to serialize payload: {e}"))
            })?,
        };
        self.seal(&plaintext)
    }

    /// Decrypt a string produced by [`encrypt`](Self::encrypt).
    ///
    /// With `as_structured` the plaintext is parsed as JSON.
    ///
    /// # Errors
    /// Every failure (bad base64, unknown envelope, tampered ciphertext, wrong
    /// key, invalid UTF-8 or JSON) is reported as `CommonError::Crypto`.
    pub fn decrypt(&self, encrypted: &str, as_structured: bool) -> CommonResult<Payload> {
        let plaintext = self.open(encrypted)?;
        if as_structured {
            serde_json::from_slice(&plaintext).map(Payload::Structured).map_err(|e| {
                CommonError::crypto("decrypt", format!("Decrypted payload is not JSON: {e}"))
            })
        } else {
            String::from_utf8(plaintext).map(Payload::Text).map_err(|_| {
                CommonError::crypto("decrypt", "Decrypted payload is not valid UTF-8")
            })
        }
    }

    /// Serialize `value` to JSON and encrypt it.
    pub fn encrypt_json<T: Serialize>(&self, value: &T) -> CommonResult<String> {
        let plaintext = serde_json::to_vec(value).map_err(|e| {
            CommonError::crypto("encrypt", format!("Failed to serialize payload: {e}"))
        })?;
        self.seal(&plaintext)
    }

    /// Decrypt and deserialize a value sealed by [`encrypt_json`](Self::encrypt_json).
    pub fn decrypt_json<T: DeserializeOwned>(&self, encrypted: &str) -> CommonResult<T> {
        let plaintext = self.open(encrypted)?;
        serde_json::from_slice(&plaintext).map_err(|e| {
            CommonError::crypto("decrypt", format!("Decrypted payload has unexpected shape: {e}"))
        })
    }

    /// `true` when `encrypted` opens under this key.
    pub fn is_valid_encrypted_data(&self, encrypted: &str) -> bool {
        self.open(encrypted).is_ok()
    }

    /// Generate a short, non-secret fingerprint for the current key.
    pub fn key_fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(&self.key);
        BASE64.encode(&digest[..8])
    }

    fn seal(&self, plaintext: &[u8]) -> CommonResult<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(&Nonce::from(nonce_bytes), plaintext)
            .map_err(|e| CommonError::crypto("encrypt", format!("Encryption failed: {e}")))?;

        let envelope = EncryptedData {
            version: ENVELOPE_VERSION,
            nonce: nonce_bytes.to_vec(),
            ciphertext,
            algorithm: ALGORITHM.to_string(),
        };
        let serialized = serde_json::to_vec(&envelope).map_err(|e| {
            CommonError::crypto("encrypt", format!("Failed to encode envelope: {e}"))
        })?;
        Ok(BASE64.encode(serialized))
    }

    fn open(&self, encrypted: &str) -> CommonResult<Vec<u8>> {
        let decoded = BASE64
            .decode(encrypted.trim())
            .map_err(|e| CommonError::crypto("decrypt", format!("Base64 decode failed: {e}")))?;
        let envelope: EncryptedData = serde_json::from_slice(&decoded)
            .map_err(|_| CommonError::crypto("decrypt", "Malformed encrypted envelope"))?;

        if envelope.version != ENVELOPE_VERSION || envelope.algorithm != ALGORITHM {
            return Err(CommonError::crypto(
                "decrypt",
                format!(
                    "Unsupported envelope: version {} algorithm {}",
                    envelope.version, envelope.algorithm
                ),
            ));
        }

        let nonce: [u8; NONCE_LEN] = envelope.nonce.as_slice().try_into().map_err(|_| {
            CommonError::crypto("decrypt", "Nonce must be exactly 12 bytes for AES-256-GCM")
        })?;

        self.cipher
            .decrypt(&Nonce::from(nonce), envelope.ciphertext.as_ref())
            .map_err(|_| CommonError::crypto("decrypt", "Decryption failed"))
    }
}
