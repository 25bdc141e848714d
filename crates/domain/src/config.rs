//! Service configuration structures
//!
//! Every section has serde defaults so a configuration file only needs the
//! secrets (`oauth.client_id`, `oauth.client_secret`,
//! `security.encryption_key`). [`AppConfig::validate`] enforces the rest.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    BURST_LIMIT, BURST_WINDOW_SECS, CLIENT_REQUESTS_PER_MINUTE, DEFAULT_AUTH_URL, DEFAULT_HOST,
    DEFAULT_PORT, DEFAULT_REDIRECT_URI, DEFAULT_REVOKE_URL, DEFAULT_SCOPES, DEFAULT_TOKENINFO_URL,
    DEFAULT_TOKEN_URL, MAX_BACKOFF_EXPONENT, MAX_BACKOFF_SECS, MAX_REQUEST_SIZE_BYTES,
    MAX_TOKEN_REFRESH_ATTEMPTS, RATE_LIMIT_CLEANUP_INTERVAL_SECS, RATE_LIMIT_PER_HOUR,
    RATE_LIMIT_PER_MINUTE, SESSION_CLEANUP_INTERVAL_SECS, SESSION_REQUESTS_PER_MINUTE,
    SESSION_STORAGE_TTL_SECS, SESSION_TIMEOUT_SECS, STORAGE_CONNECT_TIMEOUT_SECS,
    TOKEN_EXPIRY_BUFFER_SECS,
};
use crate::errors::{Result, TuneLinkError};
use crate::impl_domain_status_conversions;

/// Top-level service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub oauth: OAuthConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    /// Check cross-field constraints that serde cannot express.
    ///
    /// # Errors
    /// Returns `TuneLinkError::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        self.oauth.validate()?;
        self.security.validate()?;
        self.rate_limit.validate()?;
        self.storage.validate()?;
        self.server.validate()
    }
}

/// OAuth client registration and provider endpoints
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub auth_url: String,
    pub token_url: String,
    pub revoke_url: String,
    pub tokeninfo_url: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            scopes: DEFAULT_SCOPES.iter().map(|s| (*s).to_string()).collect(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            revoke_url: DEFAULT_REVOKE_URL.to_string(),
            tokeninfo_url: DEFAULT_TOKENINFO_URL.to_string(),
        }
    }
}

impl std::fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("revoke_url", &self.revoke_url)
            .field("tokeninfo_url", &self.tokeninfo_url)
            .finish()
    }
}

impl OAuthConfig {
    /// Space-separated scope list as sent to the provider.
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }

    fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(TuneLinkError::Config("oauth.client_id is required".into()));
        }
        if self.client_secret.trim().is_empty() {
            return Err(TuneLinkError::Config("oauth.client_secret is required".into()));
        }
        if self.scopes.is_empty() {
            return Err(TuneLinkError::Config("oauth.scopes must not be empty".into()));
        }
        for (field, value) in [
            ("oauth.redirect_uri", &self.redirect_uri),
            ("oauth.auth_url", &self.auth_url),
            ("oauth.token_url", &self.token_url),
            ("oauth.revoke_url", &self.revoke_url),
            ("oauth.tokeninfo_url", &self.tokeninfo_url),
        ] {
            if !(value.starts_with("https://") || value.starts_with("http://")) {
                return Err(TuneLinkError::Config(format!("{field} must be an http(s) URL")));
            }
        }
        Ok(())
    }
}

/// Security knobs shared by the validator, encryption and session layers
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Standard base64 of a 32-byte AES-256 key.
    pub encryption_key: String,
    pub token_expiry_buffer_secs: i64,
    pub session_timeout_secs: i64,
    pub max_token_refresh_attempts: u32,
    /// Exact hosts (or `host:port`) accepted in redirect URIs. Empty accepts
    /// any host.
    pub allowed_redirect_domains: Vec<String>,
    pub allowed_ips: Vec<String>,
    pub blocked_ips: Vec<String>,
    pub max_request_size: usize,
    pub session_cleanup_interval_secs: u64,
    pub session_requests_per_minute: u32,
    /// Per-address limit on the public OAuth endpoints
    pub client_requests_per_minute: u32,
    /// Take the client address from `X-Forwarded-For` / `X-Real-IP`. Only
    /// enable behind a proxy that overwrites these headers.
    pub trust_proxy: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            encryption_key: String::new(),
            token_expiry_buffer_secs: TOKEN_EXPIRY_BUFFER_SECS,
            session_timeout_secs: SESSION_TIMEOUT_SECS,
            max_token_refresh_attempts: MAX_TOKEN_REFRESH_ATTEMPTS,
            allowed_redirect_domains: Vec::new(),
            allowed_ips: Vec::new(),
            blocked_ips: Vec::new(),
            max_request_size: MAX_REQUEST_SIZE_BYTES,
            session_cleanup_interval_secs: SESSION_CLEANUP_INTERVAL_SECS,
            session_requests_per_minute: SESSION_REQUESTS_PER_MINUTE,
            client_requests_per_minute: CLIENT_REQUESTS_PER_MINUTE,
            trust_proxy: false,
        }
    }
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("encryption_key", &"[REDACTED]")
            .field("token_expiry_buffer_secs", &self.token_expiry_buffer_secs)
            .field("session_timeout_secs", &self.session_timeout_secs)
            .field("max_token_refresh_attempts", &self.max_token_refresh_attempts)
            .field("allowed_redirect_domains", &self.allowed_redirect_domains)
            .field("allowed_ips", &self.allowed_ips)
            .field("blocked_ips", &self.blocked_ips)
            .field("max_request_size", &self.max_request_size)
            .field("session_cleanup_interval_secs", &self.session_cleanup_interval_secs)
            .field("session_requests_per_minute", &self.session_requests_per_minute)
            .field("client_requests_per_minute", &self.client_requests_per_minute)
            .field("trust_proxy", &self.trust_proxy)
            .finish()
    }
}

impl SecurityConfig {
    pub fn session_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.session_cleanup_interval_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.encryption_key.trim().is_empty() {
            return Err(TuneLinkError::Config("security.encryption_key is required".into()));
        }
        if self.session_timeout_secs <= 0 {
            return Err(TuneLinkError::Config(
                "security.session_timeout_secs must be positive".into(),
            ));
        }
        if self.token_expiry_buffer_secs < 0 {
            return Err(TuneLinkError::Config(
                "security.token_expiry_buffer_secs must not be negative".into(),
            ));
        }
        if self.max_token_refresh_attempts == 0 {
            return Err(TuneLinkError::Config(
                "security.max_token_refresh_attempts must be at least 1".into(),
            ));
        }
        if self.session_cleanup_interval_secs == 0 {
            return Err(TuneLinkError::Config(
                "security.session_cleanup_interval_secs must be positive".into(),
            ));
        }
        if self.client_requests_per_minute == 0 {
            return Err(TuneLinkError::Config(
                "security.client_requests_per_minute must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Sliding-window limits applied per session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub requests_per_hour: u32,
    pub burst_limit: u32,
    pub burst_window_secs: u64,
    pub cleanup_interval_secs: u64,
    pub max_backoff_secs: u64,
    pub max_backoff_exponent: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: RATE_LIMIT_PER_MINUTE,
            requests_per_hour: RATE_LIMIT_PER_HOUR,
            burst_limit: BURST_LIMIT,
            burst_window_secs: BURST_WINDOW_SECS,
            cleanup_interval_secs: RATE_LIMIT_CLEANUP_INTERVAL_SECS,
            max_backoff_secs: MAX_BACKOFF_SECS,
            max_backoff_exponent: MAX_BACKOFF_EXPONENT,
        }
    }
}

impl RateLimitConfig {
    pub fn burst_window(&self) -> Duration {
        Duration::from_secs(self.burst_window_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.requests_per_minute == 0 || self.requests_per_hour == 0 || self.burst_limit == 0 {
            return Err(TuneLinkError::Config("rate_limit limits must be positive".into()));
        }
        if self.requests_per_hour < self.requests_per_minute {
            return Err(TuneLinkError::Config(
                "rate_limit.requests_per_hour must be >= requests_per_minute".into(),
            ));
        }
        if self.burst_window_secs == 0 || self.cleanup_interval_secs == 0 {
            return Err(TuneLinkError::Config("rate_limit windows must be positive".into()));
        }
        Ok(())
    }
}

/// Token storage backend selector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Redis,
}

impl_domain_status_conversions!(StorageBackend {
    Memory => "memory",
    Redis => "redis",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub redis_url: Option<String>,
    pub connect_timeout_secs: u64,
    pub session_ttl_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            redis_url: None,
            connect_timeout_secs: STORAGE_CONNECT_TIMEOUT_SECS,
            session_ttl_secs: SESSION_STORAGE_TTL_SECS,
        }
    }
}

impl StorageConfig {
    fn validate(&self) -> Result<()> {
        if self.backend == StorageBackend::Redis
            && self.redis_url.as_deref().map_or(true, |url| url.trim().is_empty())
        {
            return Err(TuneLinkError::Config(
                "storage.redis_url is required for the redis backend".into(),
            ));
        }
        Ok(())
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl_domain_status_conversions!(LogFormat {
    Pretty => "pretty",
    Json => "json",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Externally visible base URL used when advertising the authorize
    /// endpoint. Derived from host and port when unset.
    pub public_url: Option<String>,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            public_url: None,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

const LOG_LEVELS: [&str; 7] = ["trace", "debug", "info", "warn", "warning", "error", "critical"];

impl ServerConfig {
    /// `host:port` string for binding the listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Public base URL without a trailing slash.
    pub fn base_url(&self) -> String {
        match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }

    /// Map the configured level onto a `tracing` filter directive.
    ///
    /// `warning` and `critical` are accepted as aliases of `warn` and `error`.
    pub fn tracing_level(&self) -> &'static str {
        match self.log_level.to_ascii_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "warn" | "warning" => "warn",
            "error" | "critical" => "error",
            _ => "info",
        }
    }

    fn validate(&self) -> Result<()> {
        let level = self.log_level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(TuneLinkError::Config(format!(
                "server.log_level must be one of {}",
                LOG_LEVELS.join(", ")
            )));
        }
        if self.port == 0 {
            return Err(TuneLinkError::Config("server.port must be non-zero".into()));
        }
        Ok(())
    }
}
