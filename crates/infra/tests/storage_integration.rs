//! Integration tests for the storage backends.
//!
//! The Redis tests only exercise behaviour that needs no running server:
//! lazy connection, connection failures and URL validation.

use std::sync::Arc;
use std::time::Duration;

use tunelink_common::auth::{token_key, OAuthToken, TokenKind, TokenRecord, UserSession};
use tunelink_common::EncryptionManager;
use tunelink_core::TokenStorage;
use tunelink_domain::{StorageBackend, StorageConfig, TuneLinkError};
use tunelink_infra::{build_storage, RedisTokenStorage};

fn encryption() -> Arc<EncryptionManager> {
    Arc::new(EncryptionManager::new(&EncryptionManager::generate_key()).unwrap())
}

#[tokio::test]
async fn memory_backend_from_factory() {
    let storage = build_storage(&StorageConfig::default(), encryption()).unwrap();
    assert_eq!(storage.backend_name(), "memory");
    assert!(storage.health_check().await.is_ok());

    let mut session = UserSession::new(Some("198.51.100.4".into()), Some("test-agent/1.0".into()));
    session.authorize(OAuthToken::new("ya29.abc", Some("1//r".into()), 3600, "s"), None);
    storage.store_session(&session.session_id, &session).await.unwrap();

    let key = token_key("ya29.abc");
    let record = TokenRecord {
        session_id: session.session_id.clone(),
        token_type: TokenKind::Access,
        expires_at: Some(session.token.as_ref().unwrap().expires_at()),
    };
    storage.store_token(&key, &record, Some(Duration::from_secs(3600))).await.unwrap();

    assert_eq!(storage.get_session(&session.session_id).await.unwrap(), Some(session.clone()));
    assert_eq!(storage.get_token(&key).await.unwrap(), Some(record));
    assert!(storage.delete_session(&session.session_id).await.unwrap());
    assert!(!storage.delete_session(&session.session_id).await.unwrap());
}

#[test]
fn redis_backend_requires_url() {
    let config = StorageConfig { backend: StorageBackend::Redis, ..StorageConfig::default() };
    assert!(matches!(build_storage(&config, encryption()), Err(TuneLinkError::Config(_))));
}

#[test]
fn redis_rejects_malformed_url() {
    let result = RedisTokenStorage::new("not-a-redis-url", &StorageConfig::default(), encryption());
    assert!(matches!(result, Err(TuneLinkError::Config(_))));
}

/// Validates `RedisTokenStorage` behavior for the unreachable server
/// scenario.
///
/// Assertions:
/// - Ensures construction does not connect.
/// - Confirms every operation fails with a storage error.
/// - Confirms no connection is cached after the failure.
#[tokio::test]
async fn redis_connection_failure_is_storage_error() {
    let config = StorageConfig {
        backend: StorageBackend::Redis,
        redis_url: Some("redis://127.0.0.1:9".into()),
        connect_timeout_secs: 1,
        ..StorageConfig::default()
    };
    let storage = RedisTokenStorage::new("redis://127.0.0.1:9", &config, encryption()).unwrap();
    assert!(!storage.is_connected().await);

    let session = UserSession::new(None, None);
    let err = storage.store_session(&session.session_id, &session).await.unwrap_err();
    assert!(matches!(err, TuneLinkError::Storage(_)), "got {err:?}");
    assert!(matches!(storage.get_session(&session.session_id).await, Err(TuneLinkError::Storage(_))));
    assert!(matches!(storage.health_check().await, Err(TuneLinkError::Storage(_))));
    assert!(!storage.is_connected().await);

    storage.close().await;
    assert_eq!(storage.backend_name(), "redis");
}
