//! Port interfaces for session persistence and the OAuth provider
//!
//! These traits define the boundaries between core session logic and the
//! infrastructure implementations (in-memory or Redis storage, the reqwest
//! OAuth client).

use std::time::Duration;

use async_trait::async_trait;
use tunelink_common::auth::{OAuthToken, PKCEChallenge, TokenRecord, UserSession};
use tunelink_domain::Result;

/// Encrypted persistence for sessions and token index records
///
/// Implementations encrypt every value before it leaves the process. Reads of
/// a missing or undecodable entry return `Ok(None)`.
#[async_trait]
pub trait TokenStorage: Send + Sync {
    async fn store_session(&self, session_id: &str, session: &UserSession) -> Result<()>;

    async fn get_session(&self, session_id: &str) -> Result<Option<UserSession>>;

    /// Returns `true` when an entry was removed
    async fn delete_session(&self, session_id: &str) -> Result<bool>;

    /// Store a token index record; `ttl` is advisory for backends without
    /// expiry support
    async fn store_token(&self, key: &str, record: &TokenRecord, ttl: Option<Duration>)
        -> Result<()>;

    async fn get_token(&self, key: &str) -> Result<Option<TokenRecord>>;

    async fn delete_token(&self, key: &str) -> Result<bool>;

    /// Short backend identifier for stats ("memory", "redis")
    fn backend_name(&self) -> &'static str;

    async fn health_check(&self) -> Result<()>;
}

/// OAuth 2.1 authorization-code + PKCE provider
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Authorization endpoint URL for a pending session
    fn generate_auth_url(&self, pkce: &PKCEChallenge, state: &str) -> Result<String>;

    async fn exchange_code_for_token(
        &self,
        code: &str,
        pkce: &PKCEChallenge,
        state: &str,
    ) -> Result<OAuthToken>;

    /// Fails immediately when `token` has no refresh token
    async fn refresh_token(&self, token: &OAuthToken) -> Result<OAuthToken>;

    /// Best effort; failures are reported as `false`
    async fn revoke_token(&self, token: &OAuthToken) -> bool;

    async fn validate_token(&self, token: &OAuthToken) -> bool;

    /// Constant-time comparison of the callback state
    fn validate_callback_state(&self, received: &str, expected: &str) -> bool;
}
