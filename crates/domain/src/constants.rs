//! Application constants
//!
//! Centralized location for all domain-level constants used throughout the
//! service. Configurable values live in [`crate::config`] and default to the
//! constants below.

// OAuth protocol
pub const PKCE_CHALLENGE_METHOD: &str = "S256";
pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";
pub const PKCE_VERIFIER_BYTES: usize = 32;
pub const SESSION_ID_BYTES: usize = 32;
/// Length of a URL-safe base64 encoding of 32 random bytes.
pub const SESSION_ID_LENGTH: usize = 43;

// Provider endpoints
pub const DEFAULT_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";
pub const DEFAULT_TOKENINFO_URL: &str = "https://www.googleapis.com/oauth2/v1/tokeninfo";
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8080/auth/callback";
pub const DEFAULT_SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/youtube.readonly",
    "https://www.googleapis.com/auth/youtubepartner",
];

// HTTP timeouts (seconds)
pub const TOKEN_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const REVOKE_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const VALIDATE_REQUEST_TIMEOUT_SECS: u64 = 10;

// Token lifecycle
pub const TOKEN_EXPIRY_BUFFER_SECS: i64 = 60;
/// Longest token lifetime accepted from a provider (one year).
pub const MAX_TOKEN_LIFETIME_SECS: i64 = 365 * 24 * 3600;
pub const MAX_TOKEN_REFRESH_ATTEMPTS: u32 = 3;
pub const REFRESH_BACKOFF_BASE_SECS: u64 = 2;
pub const REFRESH_BACKOFF_CAP_SECS: u64 = 10;

// Sessions
pub const SESSION_TIMEOUT_SECS: i64 = 3600;
pub const SESSION_CLEANUP_INTERVAL_SECS: u64 = 300;
pub const SESSION_CLEANUP_ERROR_COOLDOWN_SECS: u64 = 60;
pub const SESSION_REQUESTS_PER_MINUTE: u32 = 60;
/// Idle session metrics older than this are dropped by the session sweep
pub const METRICS_RETENTION_SECS: u64 = 24 * 3600;
/// Unauthenticated OAuth requests admitted per client address each minute
pub const CLIENT_REQUESTS_PER_MINUTE: u32 = 60;
pub const SESSION_RATE_WINDOW_SECS: i64 = 60;

// Rate limiter
pub const RATE_LIMIT_PER_MINUTE: u32 = 30;
pub const RATE_LIMIT_PER_HOUR: u32 = 1000;
pub const BURST_LIMIT: u32 = 10;
pub const BURST_WINDOW_SECS: u64 = 10;
pub const RATE_LIMIT_CLEANUP_INTERVAL_SECS: u64 = 300;
pub const MAX_BACKOFF_SECS: u64 = 60;
pub const MAX_BACKOFF_EXPONENT: u32 = 6;

// Storage
pub const SESSION_KEY_PREFIX: &str = "session:";
pub const TOKEN_KEY_PREFIX: &str = "token:";
pub const SESSION_STORAGE_TTL_SECS: u64 = 3600;
pub const STORAGE_CONNECT_TIMEOUT_SECS: u64 = 5;

// Security validation
pub const MIN_STATE_LENGTH: usize = 32;
pub const MIN_AUTH_CODE_LENGTH: usize = 10;
pub const MIN_VERIFIER_LENGTH: usize = 43;
pub const MAX_VERIFIER_LENGTH: usize = 128;
pub const MAX_USER_AGENT_LENGTH: usize = 500;
pub const MAX_REQUEST_SIZE_BYTES: usize = 1024 * 1024;
pub const MAX_SANITIZED_INPUT_LENGTH: usize = 1000;
pub const REDACTED_PREFIX_LEN: usize = 8;

// Server
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8081;
pub const AUTH_REALM: &str = "tunelink";
pub const AUTHORIZE_PATH: &str = "/oauth/authorize";
