//! OAuth 2.1 authorization-code + PKCE client for the music provider
//!
//! Implements [`OAuthProvider`] over `reqwest`:
//! - authorization URL building (offline access, forced consent)
//! - code exchange and token refresh against the token endpoint
//! - best-effort revocation and tokeninfo validation
//!
//! Refresh is retried with exponential backoff, but only for transport
//! failures; a provider rejection is returned immediately.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, instrument, warn};
use tunelink_common::auth::{
    validate_state, OAuthErrorResponse, OAuthToken, PKCEChallenge, TokenResponse,
};
use tunelink_common::resilience::policies::PredicateRetry;
use tunelink_common::resilience::{RetryConfig, RetryExecutor};
use tunelink_core::OAuthProvider;
use tunelink_domain::constants::{
    REFRESH_BACKOFF_BASE_SECS, REFRESH_BACKOFF_CAP_SECS, REVOKE_REQUEST_TIMEOUT_SECS,
    TOKEN_REQUEST_TIMEOUT_SECS, VALIDATE_REQUEST_TIMEOUT_SECS,
};
use tunelink_domain::{redact, OAuthConfig, Result, TuneLinkError};
use url::Url;

use crate::errors::InfraError;

fn http_err(err: reqwest::Error) -> TuneLinkError {
    InfraError::from(err).into()
}

/// reqwest-backed OAuth provider client
pub struct OAuthManager {
    config: OAuthConfig,
    http: Client,
    retry: RetryConfig,
}

impl std::fmt::Debug for OAuthManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthManager")
            .field("config", &self.config)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl OAuthManager {
    /// Create a manager for the given client registration.
    ///
    /// `max_refresh_attempts` bounds the total attempts of one refresh.
    ///
    /// # Errors
    /// Returns `TuneLinkError::Config` if the authorization endpoint is not a
    /// valid URL or the HTTP client cannot be built.
    pub fn new(config: OAuthConfig, max_refresh_attempts: u32) -> Result<Self> {
        Url::parse(&config.auth_url).map_err(|e| {
            TuneLinkError::Config(format!("oauth.auth_url is not a valid URL: {e}"))
        })?;

        let http = Client::builder()
            .build()
            .map_err(|e| TuneLinkError::Config(format!("Failed to build HTTP client: {e}")))?;

        let retry = RetryConfig::exponential(
            max_refresh_attempts.max(1),
            Duration::from_secs(REFRESH_BACKOFF_BASE_SECS),
            Duration::from_secs(REFRESH_BACKOFF_CAP_SECS),
        );

        Ok(Self { config, http, retry })
    }

    /// Replace the refresh retry schedule
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// POST a form to the token endpoint and decode the success payload.
    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .http
            .post(&self.config.token_url)
            .timeout(Duration::from_secs(TOKEN_REQUEST_TIMEOUT_SECS))
            .form(params)
            .send()
            .await
            .map_err(http_err)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = serde_json::from_str::<OAuthErrorResponse>(&body)
                .map(TuneLinkError::from)
                .unwrap_or_else(|_| {
                    TuneLinkError::oauth(
                        "token_request_failed",
                        Some(format!("Token endpoint returned HTTP {}", status.as_u16())),
                    )
                });
            warn!(status = status.as_u16(), error_code = error.error_code(), "Token endpoint rejected request");
            return Err(error);
        }

        response.json::<TokenResponse>().await.map_err(|e| {
            TuneLinkError::oauth("invalid_response", Some(format!("Malformed token response: {e}")))
        })
    }
}

#[async_trait]
impl OAuthProvider for OAuthManager {
    fn generate_auth_url(&self, pkce: &PKCEChallenge, state: &str) -> Result<String> {
        let scope = self.config.scope_string();
        let params = [
            ("response_type", "code"),
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("scope", scope.as_str()),
            ("state", state),
            ("code_challenge", pkce.code_challenge.as_str()),
            ("code_challenge_method", pkce.code_challenge_method.as_str()),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ];

        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let separator = if self.config.auth_url.contains('?') { '&' } else { '?' };
        let url = format!("{}{separator}{query}", self.config.auth_url);

        debug!(state = %redact(state), "Generated authorization URL");
        Ok(url)
    }

    #[instrument(skip_all, fields(state = %redact(state)))]
    async fn exchange_code_for_token(
        &self,
        code: &str,
        pkce: &PKCEChallenge,
        state: &str,
    ) -> Result<OAuthToken> {
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code_verifier", pkce.code_verifier.as_str()),
        ];

        let response = self.token_request(&params).await?;
        let token = OAuthToken::from_exchange(response, &self.config.scope_string())?;

        info!(
            access_token = %redact(&token.access_token),
            expires_in = token.expires_in,
            has_refresh_token = token.refresh_token.is_some(),
            "Exchanged authorization code for token"
        );
        Ok(token)
    }

    #[instrument(skip_all, fields(refresh_count = token.refresh_count))]
    async fn refresh_token(&self, token: &OAuthToken) -> Result<OAuthToken> {
        let refresh_token = token
            .refresh_token
            .as_deref()
            .filter(|rt| !rt.is_empty())
            .ok_or_else(|| {
                TuneLinkError::oauth("invalid_grant", Some("No refresh token available".into()))
            })?;

        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ];

        let executor =
            RetryExecutor::new(self.retry.clone(), PredicateRetry::new(TuneLinkError::is_retryable));
        let params = &params;
        let response = executor.execute(move || self.token_request(params)).await?;

        let refreshed = token.refresh(response)?;
        info!(
            access_token = %redact(&refreshed.access_token),
            refresh_count = refreshed.refresh_count,
            "Refreshed access token"
        );
        Ok(refreshed)
    }

    async fn revoke_token(&self, token: &OAuthToken) -> bool {
        let result = self
            .http
            .post(&self.config.revoke_url)
            .timeout(Duration::from_secs(REVOKE_REQUEST_TIMEOUT_SECS))
            .form(&[("token", token.access_token.as_str())])
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                info!(access_token = %redact(&token.access_token), "Token revoked");
                true
            }
            Ok(response) => {
                warn!(status = response.status().as_u16(), "Token revocation rejected");
                false
            }
            Err(e) => {
                warn!(error = %http_err(e), "Token revocation failed");
                false
            }
        }
    }

    async fn validate_token(&self, token: &OAuthToken) -> bool {
        let result = self
            .http
            .get(&self.config.tokeninfo_url)
            .timeout(Duration::from_secs(VALIDATE_REQUEST_TIMEOUT_SECS))
            .query(&[("access_token", token.access_token.as_str())])
            .send()
            .await;

        match result {
            Ok(response) => response.status() == reqwest::StatusCode::OK,
            Err(e) => {
                warn!(error = %http_err(e), "Token validation request failed");
                false
            }
        }
    }

    fn validate_callback_state(&self, received: &str, expected: &str) -> bool {
        let matches = validate_state(expected, received);
        if !matches {
            warn!(
                target: "security",
                received_len = received.len(),
                expected_len = expected.len(),
                "OAuth callback state mismatch"
            );
        }
        matches
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for oauth::manager.
    use super::*;

    fn manager() -> OAuthManager {
        let config = OAuthConfig {
            client_id: "client id".into(),
            client_secret: "s3cret".into(),
            ..OAuthConfig::default()
        };
        OAuthManager::new(config, 3).unwrap()
    }

    /// Validates `OAuthManager::generate_auth_url` behavior for the pkce
    /// authorization url scenario.
    ///
    /// Assertions:
    /// - Confirms every required query parameter is present and decoded
    ///   correctly.
    /// - Ensures the verifier never appears in the URL.
    #[test]
    fn auth_url_carries_pkce_parameters() {
        let manager = manager();
        let pkce = PKCEChallenge::generate();

        let url = manager.generate_auth_url(&pkce, "state-value").unwrap();
        let parsed = Url::parse(&url).unwrap();
        let query: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();

        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["client_id"], "client id");
        assert_eq!(query["state"], "state-value");
        assert_eq!(query["code_challenge"], pkce.code_challenge);
        assert_eq!(query["code_challenge_method"], "S256");
        assert_eq!(query["access_type"], "offline");
        assert_eq!(query["prompt"], "consent");
        assert_eq!(query["scope"], manager.config().scope_string());
        assert!(!url.contains(&pkce.code_verifier));
    }

    #[test]
    fn callback_state_comparison() {
        let manager = manager();
        assert!(manager.validate_callback_state("abc", "abc"));
        assert!(!manager.validate_callback_state("abd", "abc"));
        assert!(!manager.validate_callback_state("", "abc"));
    }

    #[tokio::test]
    async fn refresh_without_refresh_token_fails_fast() {
        let manager = manager();
        let token = OAuthToken::new("access", None, 3600, "scope");

        let err = manager.refresh_token(&token).await.unwrap_err();
        assert!(matches!(err, TuneLinkError::OAuth { ref error, .. } if error == "invalid_grant"));
    }

    #[test]
    fn debug_hides_client_secret() {
        let debug = format!("{:?}", manager());
        assert!(!debug.contains("s3cret"));
    }

    #[test]
    fn invalid_auth_url_is_config_error() {
        let config = OAuthConfig { auth_url: "not a url".into(), ..OAuthConfig::default() };
        assert!(matches!(OAuthManager::new(config, 3), Err(TuneLinkError::Config(_))));
    }
}
