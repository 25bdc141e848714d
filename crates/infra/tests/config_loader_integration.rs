//! Integration tests for configuration loader
//!
//! Tests the end-to-end behavior of loading configuration from files.

use std::io::Write;

use tempfile::NamedTempFile;
use tunelink_common::EncryptionManager;
use tunelink_domain::{LogFormat, StorageBackend, TuneLinkError};
use tunelink_infra::config;

fn write_config(contents: &str, suffix: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .prefix("tunelink-config")
        .suffix(suffix)
        .tempfile()
        .expect("Failed to create temp file");
    file.write_all(contents.as_bytes()).expect("Failed to write to temp file");
    file
}

#[test]
fn test_load_config_from_json_file() {
    let key = EncryptionManager::generate_key();
    let json_content = format!(
        r#"{{
        "oauth": {{
            "client_id": "music-client",
            "client_secret": "music-secret",
            "redirect_uri": "https://app.example.com/oauth/callback"
        }},
        "security": {{
            "encryption_key": "{key}",
            "allowed_redirect_domains": ["app.example.com"],
            "session_timeout_secs": 1800
        }},
        "rate_limit": {{
            "requests_per_minute": 12,
            "burst_limit": 3
        }},
        "server": {{
            "port": 9000,
            "log_format": "json"
        }}
    }}"#
    );

    let file = write_config(&json_content, ".json");
    let config = config::load_from_file(Some(file.path().to_path_buf()))
        .expect("Failed to load config from JSON file");

    assert_eq!(config.oauth.client_id, "music-client");
    assert_eq!(config.oauth.redirect_uri, "https://app.example.com/oauth/callback");
    assert_eq!(config.security.allowed_redirect_domains, vec!["app.example.com".to_string()]);
    assert_eq!(config.security.session_timeout_secs, 1800);
    assert_eq!(config.rate_limit.requests_per_minute, 12);
    assert_eq!(config.rate_limit.requests_per_hour, 1000);
    assert_eq!(config.rate_limit.burst_limit, 3);
    assert_eq!(config.storage.backend, StorageBackend::Memory);
    assert_eq!(config.server.port, 9000);
    assert_eq!(config.server.log_format, LogFormat::Json);
    assert!(config::validate(&config).is_ok());
}

#[test]
fn test_load_config_from_toml_file() {
    let key = EncryptionManager::generate_key();
    let toml_content = format!(
        r#"
[oauth]
client_id = "music-client"
client_secret = "music-secret"
scopes = ["https://www.googleapis.com/auth/youtube.readonly"]

[security]
encryption_key = "{key}"

[storage]
backend = "redis"
redis_url = "redis://cache.internal:6379/0"

[server]
public_url = "https://auth.example.com/"
log_level = "debug"
"#
    );

    let file = write_config(&toml_content, ".toml");
    let config = config::load_from_file(Some(file.path().to_path_buf()))
        .expect("Failed to load config from TOML file");

    assert_eq!(config.oauth.scopes.len(), 1);
    assert_eq!(config.storage.backend, StorageBackend::Redis);
    assert_eq!(config.storage.redis_url.as_deref(), Some("redis://cache.internal:6379/0"));
    assert_eq!(config.server.base_url(), "https://auth.example.com");
    assert_eq!(config.server.tracing_level(), "debug");
    assert!(config::validate(&config).is_ok());
}

#[test]
fn test_file_without_secrets_fails_validation() {
    let file = write_config(r#"{ "server": { "port": 8081 } }"#, ".json");
    let config = config::load_from_file(Some(file.path().to_path_buf()))
        .expect("Defaults should fill every section");

    match config::validate(&config) {
        Err(TuneLinkError::Config(msg)) => assert!(msg.contains("client_id")),
        other => panic!("expected config error, got {other:?}"),
    }
}

#[test]
fn test_invalid_log_level_fails_validation() {
    let key = EncryptionManager::generate_key();
    let json_content = format!(
        r#"{{
        "oauth": {{ "client_id": "c", "client_secret": "s" }},
        "security": {{ "encryption_key": "{key}" }},
        "server": {{ "log_level": "verbose" }}
    }}"#
    );

    let file = write_config(&json_content, ".json");
    let config = config::load_from_file(Some(file.path().to_path_buf())).unwrap();
    assert!(matches!(config::validate(&config), Err(TuneLinkError::Config(msg)) if msg.contains("log_level")));
}

#[test]
fn test_invalid_toml_is_config_error() {
    let file = write_config("[oauth\nclient_id = ", ".toml");
    let result = config::load_from_file(Some(file.path().to_path_buf()));
    assert!(matches!(result, Err(TuneLinkError::Config(msg)) if msg.contains("TOML")));
}
