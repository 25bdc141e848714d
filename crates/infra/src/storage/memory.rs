//! In-process token storage
//!
//! Values are encrypted before insert and decrypted on read, so a heap dump
//! never shows plaintext tokens. TTLs are not enforced; the session sweep is
//! responsible for expiry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tunelink_common::auth::{TokenRecord, UserSession};
use tunelink_common::EncryptionManager;
use tunelink_core::TokenStorage;
use tunelink_domain::{redact, Result};

use super::{open, seal, session_key, token_key};

/// `DashMap`-backed storage of encrypted strings
pub struct MemoryTokenStorage {
    encryption: Arc<EncryptionManager>,
    sessions: DashMap<String, String>,
    tokens: DashMap<String, String>,
}

impl MemoryTokenStorage {
    pub fn new(encryption: Arc<EncryptionManager>) -> Self {
        Self { encryption, sessions: DashMap::new(), tokens: DashMap::new() }
    }

    /// Number of stored sessions
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Raw stored value for a session, for inspection in tests and tooling
    pub fn raw_session(&self, session_id: &str) -> Option<String> {
        self.sessions.get(&session_key(session_id)).map(|v| v.value().clone())
    }
}

#[async_trait]
impl TokenStorage for MemoryTokenStorage {
    async fn store_session(&self, session_id: &str, session: &UserSession) -> Result<()> {
        let sealed = seal(&self.encryption, session)?;
        self.sessions.insert(session_key(session_id), sealed);
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<UserSession>> {
        let key = session_key(session_id);
        let Some(sealed) = self.sessions.get(&key).map(|v| v.value().clone()) else {
            return Ok(None);
        };

        let session: Option<UserSession> = open(&self.encryption, &key, &sealed);
        Ok(session.filter(|s| match s.validate() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key = %redact(&key), error = %e, "Discarding invalid stored session");
                false
            }
        }))
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool> {
        Ok(self.sessions.remove(&session_key(session_id)).is_some())
    }

    async fn store_token(
        &self,
        key: &str,
        record: &TokenRecord,
        _ttl: Option<Duration>,
    ) -> Result<()> {
        let sealed = seal(&self.encryption, record)?;
        self.tokens.insert(token_key(key), sealed);
        Ok(())
    }

    async fn get_token(&self, key: &str) -> Result<Option<TokenRecord>> {
        let key = token_key(key);
        Ok(self
            .tokens
            .get(&key)
            .map(|v| v.value().clone())
            .and_then(|sealed| open(&self.encryption, &key, &sealed)))
    }

    async fn delete_token(&self, key: &str) -> Result<bool> {
        Ok(self.tokens.remove(&token_key(key)).is_some())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for storage::memory.
    use tunelink_common::auth::{OAuthToken, TokenKind};

    use super::*;

    fn storage() -> MemoryTokenStorage {
        let key = EncryptionManager::generate_key();
        MemoryTokenStorage::new(Arc::new(EncryptionManager::new(&key).unwrap()))
    }

    /// Validates `MemoryTokenStorage` behavior for the encrypted at rest
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures the stored value does not contain the access token.
    /// - Confirms the session reads back intact.
    #[tokio::test]
    async fn sessions_are_encrypted_at_rest() {
        let storage = storage();
        let mut session = UserSession::new(Some("203.0.113.7".into()), None);
        session.authorize(
            OAuthToken::new("ya29.plaintext-access", Some("1//refresh".into()), 3600, "scope"),
            Some("user-1".into()),
        );

        storage.store_session(&session.session_id, &session).await.unwrap();

        let raw = storage.raw_session(&session.session_id).unwrap();
        assert!(!raw.contains("ya29.plaintext-access"));
        assert!(!raw.contains("203.0.113.7"));

        let loaded = storage.get_session(&session.session_id).await.unwrap().unwrap();
        assert_eq!(loaded, session);
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let storage = storage();
        let session = UserSession::new(None, None);
        storage.store_session(&session.session_id, &session).await.unwrap();

        assert!(storage.delete_session(&session.session_id).await.unwrap());
        assert!(!storage.delete_session(&session.session_id).await.unwrap());
        assert!(storage.get_session(&session.session_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn undecodable_value_reads_as_absent() {
        let storage = storage();
        storage.sessions.insert(session_key("broken"), "not-ciphertext".into());

        assert!(storage.get_session("broken").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn value_sealed_with_other_key_reads_as_absent() {
        let storage = storage();
        let other = EncryptionManager::new(&EncryptionManager::generate_key()).unwrap();
        let session = UserSession::new(None, None);
        storage
            .sessions
            .insert(session_key(&session.session_id), seal(&other, &session).unwrap());

        assert!(storage.get_session(&session.session_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn token_records_round_trip() {
        let storage = storage();
        let record =
            TokenRecord { session_id: "s1".into(), token_type: TokenKind::Access, expires_at: None };

        storage.store_token("abc", &record, Some(Duration::from_secs(60))).await.unwrap();
        assert_eq!(storage.get_token("abc").await.unwrap(), Some(record));
        assert!(storage.delete_token("abc").await.unwrap());
        assert!(storage.get_token("abc").await.unwrap().is_none());
        assert_eq!(storage.backend_name(), "memory");
    }
}
