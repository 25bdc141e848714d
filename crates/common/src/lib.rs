//! Common utilities shared across TuneLink crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: errors, validation, OAuth/PKCE data types
//! - `observability`: tracing for the modules that log
//! - `runtime`: async infrastructure (crypto, lifecycle, metrics, resilience)

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod auth;
#[cfg(feature = "foundation")]
pub mod error;
#[cfg(feature = "foundation")]
pub mod validation;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod crypto;
#[cfg(feature = "runtime")]
pub mod lifecycle;
#[cfg(feature = "runtime")]
pub mod observability;
#[cfg(feature = "runtime")]
pub mod resilience;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "foundation")]
pub use auth::{
    AuthState, OAuthErrorResponse, OAuthToken, PKCEChallenge, TokenKind, TokenRecord,
    TokenResponse, UserSession,
};
#[cfg(feature = "runtime")]
pub use crypto::{EncryptedData, EncryptionManager, Payload};
#[cfg(feature = "foundation")]
pub use error::{CommonError, CommonResult, ErrorClassification, ErrorSeverity};
#[cfg(feature = "runtime")]
pub use lifecycle::PeriodicTask;
#[cfg(feature = "runtime")]
pub use observability::{AuthMetrics, MetricsSummary, SessionMetricsSnapshot};
#[cfg(feature = "runtime")]
pub use resilience::{
    RateLimitStatus, RateLimiterStats, RetryConfig, RetryDecision, RetryExecutor, RetryPolicy,
    SlidingWindowConfig, SlidingWindowRateLimiter,
};
#[cfg(feature = "foundation")]
pub use validation::{
    FieldValidator, IpValidator, SecurityValidator, UrlValidator, ValidationError,
    ValidationResult,
};
