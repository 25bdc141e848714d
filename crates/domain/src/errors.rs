//! Error types used throughout the application

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for TuneLink
///
/// Every fallible operation in the service surfaces one of these variants.
/// Messages never carry secret material; token values are truncated with
/// [`redact`] before they reach an error.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum TuneLinkError {
    /// Malformed or disallowed input (state, code, redirect URI, ...).
    #[error("Validation error: {0}")]
    Validation(String),

    /// The OAuth provider rejected a request or returned an unusable payload.
    #[error("OAuth error ({error}): {}", .description.as_deref().unwrap_or("no description"))]
    OAuth { error: String, description: Option<String> },

    /// Transport-level failure talking to the provider. Retryable.
    #[error("Network error: {0}")]
    Network(String),

    /// Bad key, corrupted ciphertext, or failed authentication tag.
    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Rate limit exceeded: {message}")]
    RateLimitExceeded { message: String, retry_after_secs: Option<u64> },

    /// Token storage backend failure (connection, command, codec).
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TuneLinkError {
    /// Build an OAuth error from provider `error` / `error_description`.
    pub fn oauth(error: impl Into<String>, description: Option<String>) -> Self {
        Self::OAuth { error: error.into(), description }
    }

    /// Build a rate-limit error with an optional retry hint.
    pub fn rate_limited(message: impl Into<String>, retry_after_secs: Option<u64>) -> Self {
        Self::RateLimitExceeded { message: message.into(), retry_after_secs }
    }

    /// Stable machine-readable code for logs and API payloads.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::OAuth { .. } => "oauth_error",
            Self::Network(_) => "network_error",
            Self::Encryption(_) => "encryption_error",
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Self::Storage(_) => "storage_error",
            Self::NotFound(_) => "not_found",
            Self::Config(_) => "config_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Only transport failures are worth retrying; OAuth rejections are final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

/// Result type alias for TuneLink operations
pub type Result<T> = std::result::Result<T, TuneLinkError>;

/// Truncate a secret to a short prefix suitable for logs.
///
/// Values of up to [`crate::constants::REDACTED_PREFIX_LEN`] characters are
/// fully masked.
pub fn redact(secret: &str) -> String {
    let prefix_len = crate::constants::REDACTED_PREFIX_LEN;
    if secret.chars().count() <= prefix_len {
        return "***".to_string();
    }
    let prefix: String = secret.chars().take(prefix_len).collect();
    format!("{prefix}...")
}
