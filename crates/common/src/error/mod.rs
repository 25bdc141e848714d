//! Error vocabulary of the reusable building blocks in this crate
//!
//! Crypto, lifecycle and resilience code report [`CommonError`]; service
//! code speaks [`TuneLinkError`], and every `CommonError` converts into it.
//! Both implement [`ErrorClassification`], so retry loops and log sinks can
//! treat them alike.
//!
//! | Source | Variant | Domain error |
//! |--------|---------|--------------|
//! | encryption, key derivation | `Crypto` | `Encryption` |
//! | sliding-window limiter | `RateLimitExceeded` | `RateLimitExceeded` |
//! | task stop deadline | `Timeout` | `Network` |
//! | task started twice | `Config` | `Config` |
//! | panicked task | `Internal` | `Internal` |

use std::fmt;
use std::time::Duration;

use tunelink_domain::TuneLinkError;

pub type CommonResult<T> = Result<T, CommonError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    /// Misconfiguration or misuse of a component
    Config { message: String },

    RateLimitExceeded {
        limit: Option<u32>,
        window: Option<Duration>,
        retry_after: Option<Duration>,
    },

    Timeout { operation: String, duration: Duration },

    /// Key handling, encryption or decryption failure. `message` never
    /// contains key or plaintext material.
    Crypto { operation: String, message: String },

    Internal { message: String },
}

impl fmt::Display for CommonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { message } => write!(f, "Configuration error: {message}"),
            Self::RateLimitExceeded { limit, window, retry_after } => {
                f.write_str("Rate limit exceeded")?;
                if let (Some(limit), Some(window)) = (limit, window) {
                    write!(f, ": {limit} requests per {window:?}")?;
                }
                if let Some(retry) = retry_after {
                    write!(f, " (retry in {retry:?})")?;
                }
                Ok(())
            }
            Self::Timeout { operation, duration } => {
                write!(f, "Operation '{operation}' timed out after {duration:?}")
            }
            Self::Crypto { operation, message } => {
                write!(f, "Crypto error during '{operation}': {message}")
            }
            Self::Internal { message } => write!(f, "Internal error: {message}"),
        }
    }
}

impl std::error::Error for CommonError {}

impl CommonError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Rate limit error naming the exhausted window
    pub fn rate_limit_detailed(
        limit: u32,
        window: Duration,
        retry_after: Option<Duration>,
    ) -> Self {
        Self::RateLimitExceeded { limit: Some(limit), window: Some(window), retry_after }
    }

    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout { operation: operation.into(), duration }
    }

    pub fn crypto(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Crypto { operation: operation.into(), message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }
}

/// Retryability and severity of an error, independent of its type
pub trait ErrorClassification {
    /// Transient failures (timeouts, rate limits, transport errors)
    fn is_retryable(&self) -> bool;

    fn severity(&self) -> ErrorSeverity;

    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    /// Suggested delay before the next attempt
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Severity scale used to pick a log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "INFO",
            Self::Warning => "WARN",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        })
    }
}

impl ErrorClassification for CommonError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimitExceeded { .. } | Self::Timeout { .. })
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::RateLimitExceeded { .. } | Self::Timeout { .. } => ErrorSeverity::Warning,
            Self::Config { .. } => ErrorSeverity::Error,
            Self::Crypto { .. } | Self::Internal { .. } => ErrorSeverity::Critical,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimitExceeded { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl ErrorClassification for TuneLinkError {
    fn is_retryable(&self) -> bool {
        TuneLinkError::is_retryable(self)
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NotFound(_) => ErrorSeverity::Info,
            Self::Validation(_) | Self::RateLimitExceeded { .. } | Self::OAuth { .. } => {
                ErrorSeverity::Warning
            }
            Self::Network(_) | Self::Storage(_) | Self::Config(_) => ErrorSeverity::Error,
            Self::Encryption(_) | Self::Internal(_) => ErrorSeverity::Critical,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimitExceeded { retry_after_secs, .. } => {
                retry_after_secs.map(Duration::from_secs)
            }
            _ => None,
        }
    }
}

impl From<CommonError> for TuneLinkError {
    fn from(err: CommonError) -> Self {
        match err {
            CommonError::Config { message } => Self::Config(message),
            CommonError::RateLimitExceeded { retry_after, .. } => Self::RateLimitExceeded {
                retry_after_secs: retry_after.map(|d| d.as_secs().max(1)),
                message: err.to_string(),
            },
            CommonError::Timeout { .. } => Self::Network(err.to_string()),
            CommonError::Crypto { message, .. } => Self::Encryption(message),
            CommonError::Internal { message } => Self::Internal(message),
        }
    }
}
