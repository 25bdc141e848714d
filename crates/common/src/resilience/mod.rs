//! Resilience patterns for callers of rate-limited or flaky services
//!
//! - **[`rate_limiter`]**: per-session sliding windows with burst backoff
//! - **[`retry`]**: bounded retries with exponential backoff and a policy
//!   deciding which errors are worth another attempt

pub mod rate_limiter;
pub mod retry;

pub use rate_limiter::{
    RateLimitStatus, RateLimiterStats, RateLimits, SlidingWindowConfig, SlidingWindowRateLimiter,
    WindowStatus,
};
pub use retry::{policies, RetryConfig, RetryDecision, RetryExecutor, RetryPolicy};
