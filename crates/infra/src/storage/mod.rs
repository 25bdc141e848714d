//! Encrypted token storage backends
//!
//! Both backends implement [`tunelink_core::TokenStorage`] and only ever hold
//! ciphertext produced by [`EncryptionManager`]. Reads that fail to decrypt or
//! deserialize are logged with a truncated key and reported as absent.

pub mod memory;
pub mod redis_store;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tunelink_common::EncryptionManager;
use tunelink_core::TokenStorage;
use tunelink_domain::constants::{SESSION_KEY_PREFIX, TOKEN_KEY_PREFIX};
use tunelink_domain::{redact, Result, StorageBackend, StorageConfig, TuneLinkError};

pub use self::memory::MemoryTokenStorage;
pub use self::redis_store::RedisTokenStorage;

/// Build the storage backend selected by `config`
///
/// The Redis backend connects lazily, so this never touches the network.
///
/// # Errors
/// Returns `TuneLinkError::Config` when Redis is selected without a URL or
/// the URL cannot be parsed.
pub fn build_storage(
    config: &StorageConfig,
    encryption: Arc<EncryptionManager>,
) -> Result<Arc<dyn TokenStorage>> {
    match config.backend {
        StorageBackend::Memory => {
            tracing::info!("Using in-memory token storage");
            Ok(Arc::new(MemoryTokenStorage::new(encryption)))
        }
        StorageBackend::Redis => {
            let url = config.redis_url.as_deref().ok_or_else(|| {
                TuneLinkError::Config("storage.redis_url is required for the redis backend".into())
            })?;
            tracing::info!("Using Redis token storage");
            Ok(Arc::new(RedisTokenStorage::new(url, config, encryption)?))
        }
    }
}

pub(crate) fn session_key(session_id: &str) -> String {
    format!("{SESSION_KEY_PREFIX}{session_id}")
}

pub(crate) fn token_key(key: &str) -> String {
    format!("{TOKEN_KEY_PREFIX}{key}")
}

/// Serialize and encrypt a value for storage
pub(crate) fn seal<T: Serialize>(encryption: &EncryptionManager, value: &T) -> Result<String> {
    encryption.encrypt_json(value).map_err(Into::into)
}

/// Decrypt and deserialize a stored value; failures become `None`
pub(crate) fn open<T: DeserializeOwned>(
    encryption: &EncryptionManager,
    key: &str,
    sealed: &str,
) -> Option<T> {
    match encryption.decrypt_json(sealed) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key = %redact(key), error = %e, "Failed to decode stored value");
            None
        }
    }
}
