//! Integration tests for crypto module
//!
//! Validates the encrypted-string format shared by every storage backend:
//! round trips across manager instances, password-derived keys and tamper
//! detection.

#![cfg(feature = "runtime")]

use serde_json::json;
use tunelink_common::{CommonError, EncryptionManager, Payload, UserSession};

/// End-to-end round trip using one generated key across distinct manager
/// instances.
#[test]
fn round_trip_across_instances() {
    let key = EncryptionManager::generate_key();
    let writer = EncryptionManager::new(&key).expect("valid key");
    let reader = EncryptionManager::new(&key).expect("valid key");

    let payload = Payload::from(json!({"session_id": "abc", "scopes": ["a", "b"], "n": 3}));
    let sealed = writer.encrypt(&payload).unwrap();
    assert_eq!(reader.decrypt(&sealed, true).unwrap(), payload);
}

#[test]
fn empty_payloads_round_trip() {
    let manager = EncryptionManager::new(&EncryptionManager::generate_key()).unwrap();

    for payload in [Payload::from(""), Payload::from(json!({})), Payload::from(json!([]))] {
        let structured = matches!(payload, Payload::Structured(_));
        let sealed = manager.encrypt(&payload).unwrap();
        assert_eq!(manager.decrypt(&sealed, structured).unwrap(), payload);
    }
}

#[test]
fn sessions_round_trip_as_json() {
    let manager = EncryptionManager::new(&EncryptionManager::generate_key()).unwrap();
    let session = UserSession::new(Some("127.0.0.1".into()), None);

    let sealed = manager.encrypt_json(&session).unwrap();
    assert!(!sealed.contains(&session.session_id));
    let restored: UserSession = manager.decrypt_json(&sealed).unwrap();
    assert_eq!(restored, session);
}

/// Validates `EncryptionManager::derive_key_from_password` behavior for the
/// shared password scenario.
///
/// Assertions:
/// - Confirms the same password and salt yield interchangeable managers.
/// - Confirms a different salt cannot decrypt.
#[test]
fn password_derived_keys_interoperate() {
    let key_a = EncryptionManager::derive_key_from_password("correct horse", "tunelink-salt").unwrap();
    let key_b = EncryptionManager::derive_key_from_password("correct horse", "tunelink-salt").unwrap();
    let other = EncryptionManager::derive_key_from_password("correct horse", "other-salt-value").unwrap();
    assert_eq!(key_a, key_b);

    let sealed = EncryptionManager::new(&key_a).unwrap().encrypt(&Payload::from("hello")).unwrap();
    assert_eq!(
        EncryptionManager::new(&key_b).unwrap().decrypt(&sealed, false).unwrap(),
        Payload::from("hello")
    );
    assert!(EncryptionManager::new(&other).unwrap().decrypt(&sealed, false).is_err());
}

#[test]
fn tampering_is_detected() {
    let manager = EncryptionManager::new(&EncryptionManager::generate_key()).unwrap();
    let sealed = manager.encrypt(&Payload::from("secret")).unwrap();

    let mut bytes = sealed.into_bytes();
    let mid = bytes.len() / 2;
    bytes[mid] = if bytes[mid] == b'A' { b'B' } else { b'A' };
    let tampered = String::from_utf8(bytes).unwrap();

    assert!(!manager.is_valid_encrypted_data(&tampered));
    assert!(matches!(manager.decrypt(&tampered, false), Err(CommonError::Crypto { .. })));
}

#[test]
fn invalid_keys_are_rejected() {
    assert!(EncryptionManager::new("not base64 !!").is_err());
    assert!(EncryptionManager::from_key_bytes(vec![0u8; 16]).is_err());
}
