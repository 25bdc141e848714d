//! OAuth token, session and storage record types
//!
//! All records are plain serde structs so they can be encrypted as JSON and
//! handed to any storage backend. Secrets are redacted from `Debug` output.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tunelink_domain::constants::{
    DEFAULT_TOKEN_TYPE, MAX_TOKEN_LIFETIME_SECS, SESSION_ID_LENGTH, SESSION_RATE_WINDOW_SECS,
    SESSION_TIMEOUT_SECS, TOKEN_EXPIRY_BUFFER_SECS,
};
use tunelink_domain::{impl_domain_status_conversions, redact, Result, TuneLinkError};

use super::pkce::{generate_session_id, generate_state, PKCEChallenge};

/// Successful token endpoint payload
///
/// Every field is optional so that a malformed provider response surfaces as
/// an OAuth error instead of a deserialization failure.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &self.access_token.as_deref().map(redact))
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("refresh_token", &self.refresh_token.as_deref().map(redact))
            .field("scope", &self.scope)
            .finish()
    }
}

/// Error payload returned by an OAuth provider (RFC 6749 §5.2)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl From<OAuthErrorResponse> for TuneLinkError {
    fn from(resp: OAuthErrorResponse) -> Self {
        TuneLinkError::oauth(resp.error, resp.error_description)
    }
}

fn missing_field(field: &str) -> TuneLinkError {
    TuneLinkError::oauth("invalid_response", Some(format!("Token response missing {field}")))
}

fn checked_lifetime(expires_in: i64) -> Result<i64> {
    if (0..=MAX_TOKEN_LIFETIME_SECS).contains(&expires_in) {
        Ok(expires_in)
    } else {
        Err(TuneLinkError::oauth(
            "invalid_response",
            Some(format!("Token response has out-of-range expires_in {expires_in}")),
        ))
    }
}

/// OAuth access token with refresh metadata
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_type: String,
    /// Lifetime in seconds from `created_at`
    pub expires_in: i64,
    pub scope: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refreshed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub refresh_count: u32,
}

impl OAuthToken {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in: i64,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            token_type: DEFAULT_TOKEN_TYPE.to_string(),
            expires_in,
            scope: scope.into(),
            created_at: Utc::now(),
            refreshed_at: None,
            refresh_count: 0,
        }
    }

    /// Build a token from an authorization-code exchange response.
    ///
    /// # Errors
    ///
    /// Returns an OAuth error when `access_token`, `token_type` or
    /// `expires_in` is missing, or `expires_in` is negative or longer than
    /// a year.
    pub fn from_exchange(response: TokenResponse, default_scope: &str) -> Result<Self> {
        let access_token = response.access_token.ok_or_else(|| missing_field("access_token"))?;
        let token_type = response.token_type.ok_or_else(|| missing_field("token_type"))?;
        let expires_in =
            checked_lifetime(response.expires_in.ok_or_else(|| missing_field("expires_in"))?)?;

        Ok(Self {
            access_token,
            refresh_token: response.refresh_token,
            token_type,
            expires_in,
            scope: response.scope.unwrap_or_else(|| default_scope.to_string()),
            created_at: Utc::now(),
            refreshed_at: None,
            refresh_count: 0,
        })
    }

    /// `created_at + expires_in`, saturating at the representable range
    pub fn expires_at(&self) -> DateTime<Utc> {
        Duration::try_seconds(self.expires_in)
            .and_then(|lifetime| self.created_at.checked_add_signed(lifetime))
            .unwrap_or(if self.expires_in < 0 {
                DateTime::<Utc>::MIN_UTC
            } else {
                DateTime::<Utc>::MAX_UTC
            })
    }

    /// Expired once `now` reaches `expires_at - buffer_secs`
    pub fn is_expired_at(&self, now: DateTime<Utc>, buffer_secs: i64) -> bool {
        let deadline = Duration::try_seconds(buffer_secs)
            .and_then(|buffer| self.expires_at().checked_sub_signed(buffer))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        now >= deadline
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now(), TOKEN_EXPIRY_BUFFER_SECS)
    }

    pub fn is_refresh_needed(&self) -> bool {
        self.is_expired() && self.refresh_token.is_some()
    }

    /// Produce the successor token from a refresh response.
    ///
    /// The old refresh token and scope carry over when the response omits
    /// them.
    ///
    /// # Errors
    ///
    /// Returns an OAuth error when `access_token` or `expires_in` is missing,
    /// or `expires_in` is out of range.
    pub fn refresh(&self, response: TokenResponse) -> Result<Self> {
        let access_token = response.access_token.ok_or_else(|| missing_field("access_token"))?;
        let expires_in =
            checked_lifetime(response.expires_in.ok_or_else(|| missing_field("expires_in"))?)?;
        let now = Utc::now();

        Ok(Self {
            access_token,
            refresh_token: response.refresh_token.or_else(|| self.refresh_token.clone()),
            token_type: response.token_type.unwrap_or_else(|| DEFAULT_TOKEN_TYPE.to_string()),
            expires_in,
            scope: response.scope.unwrap_or_else(|| self.scope.clone()),
            created_at: now,
            refreshed_at: Some(now),
            refresh_count: self.refresh_count.saturating_add(1),
        })
    }
}

impl fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthToken")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &self.refresh_token.as_deref().map(redact))
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .field("created_at", &self.created_at)
            .field("refreshed_at", &self.refreshed_at)
            .field("refresh_count", &self.refresh_count)
            .finish()
    }
}

/// Authorization state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthState {
    Pending,
    Authorized,
    Expired,
    Revoked,
}

impl_domain_status_conversions!(AuthState {
    Pending => "pending",
    Authorized => "authorized",
    Expired => "expired",
    Revoked => "revoked",
});

/// A client's authorization session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    pub session_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub token: Option<OAuthToken>,
    pub state: AuthState,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Present only while the session is pending
    #[serde(default)]
    pub pkce: Option<PKCEChallenge>,
    /// Expected callback `state`: the session id followed by a per-flow
    /// nonce. Present only while the session is pending.
    #[serde(default)]
    pub oauth_state: Option<String>,
    #[serde(default)]
    pub request_count: u32,
    pub rate_limit_reset: DateTime<Utc>,
}

impl UserSession {
    /// New pending session with a fresh id and PKCE challenge
    pub fn new(ip_address: Option<String>, user_agent: Option<String>) -> Self {
        let now = Utc::now();
        let session_id = generate_session_id();
        Self {
            oauth_state: Some(format!("{session_id}{}", generate_state())),
            session_id,
            user_id: None,
            token: None,
            state: AuthState::Pending,
            created_at: now,
            last_accessed: now,
            ip_address,
            user_agent,
            pkce: Some(PKCEChallenge::generate()),
            request_count: 0,
            rate_limit_reset: now + Duration::seconds(SESSION_RATE_WINDOW_SECS),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == AuthState::Authorized && self.token.as_ref().is_some_and(|t| !t.is_expired())
    }

    /// Idle longer than `timeout_secs` as of `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>, timeout_secs: i64) -> bool {
        now > self.last_accessed + Duration::seconds(timeout_secs)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now(), SESSION_TIMEOUT_SECS)
    }

    pub fn touch(&mut self) {
        self.last_accessed = Utc::now();
    }

    /// Count a request against the coarse per-minute counter
    pub fn increment_request_count_at(&mut self, now: DateTime<Utc>) {
        if now >= self.rate_limit_reset {
            self.request_count = 1;
            self.rate_limit_reset = now + Duration::seconds(SESSION_RATE_WINDOW_SECS);
        } else {
            self.request_count = self.request_count.saturating_add(1);
        }
    }

    pub fn increment_request_count(&mut self) {
        self.increment_request_count_at(Utc::now());
    }

    /// Whether the coarse counter has reached `max`; an elapsed window
    /// resets the counter and reports `false`.
    pub fn is_rate_limited_at(&mut self, now: DateTime<Utc>, max: u32) -> bool {
        if now >= self.rate_limit_reset {
            self.request_count = 0;
            self.rate_limit_reset = now + Duration::seconds(SESSION_RATE_WINDOW_SECS);
            return false;
        }
        self.request_count >= max
    }

    pub fn is_rate_limited(&mut self, max: u32) -> bool {
        self.is_rate_limited_at(Utc::now(), max)
    }

    /// Session id carried in the leading characters of a callback `state`
    pub fn id_from_state(state: &str) -> Option<&str> {
        state.get(..SESSION_ID_LENGTH)
    }

    /// Attach a token and move to `Authorized`, consuming the PKCE challenge
    /// and the pending `state`
    pub fn authorize(&mut self, token: OAuthToken, user_id: Option<String>) {
        self.token = Some(token);
        self.state = AuthState::Authorized;
        self.pkce = None;
        self.oauth_state = None;
        if user_id.is_some() {
            self.user_id = user_id;
        }
        self.touch();
    }

    /// Structural checks applied after loading a session from storage.
    ///
    /// # Errors
    ///
    /// Returns a storage error describing the first inconsistency found.
    pub fn validate(&self) -> Result<()> {
        if self.session_id.is_empty() {
            return Err(TuneLinkError::Storage("Stored session has an empty id".into()));
        }
        if let Some(token) = &self.token {
            if token.access_token.is_empty() {
                return Err(TuneLinkError::Storage("Stored token has an empty access token".into()));
            }
            if checked_lifetime(token.expires_in).is_err() {
                return Err(TuneLinkError::Storage("Stored token has an invalid lifetime".into()));
            }
        }
        if self.state == AuthState::Authorized && self.token.is_none() {
            return Err(TuneLinkError::Storage("Authorized session has no token".into()));
        }
        Ok(())
    }
}

/// Which token a [`TokenRecord`] indexes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Value stored under a token key, pointing back at the owning session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub session_id: String,
    pub token_type: TokenKind,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Storage key for a token: lowercase hex SHA-256, never the token itself
pub fn token_key(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    //! Unit tests for auth::types.
    use super::*;

    fn token_at(created_at: DateTime<Utc>, expires_in: i64) -> OAuthToken {
        OAuthToken {
            created_at,
            ..OAuthToken::new("access-abcdefghijk", Some("refresh-xyz123456".into()), expires_in, "read")
        }
    }

    /// Validates `OAuthToken::is_expired_at` behavior for the expiry buffer
    /// boundary scenario.
    ///
    /// Assertions:
    /// - Confirms the token is live one second before `expires_at - 60s`.
    /// - Confirms the token is expired exactly at `expires_at - 60s`.
    #[test]
    fn token_expiry_boundary() {
        let created = Utc::now();
        let token = token_at(created, 3600);
        let boundary = created + Duration::seconds(3600 - 60);

        assert!(!token.is_expired_at(boundary - Duration::seconds(1), 60));
        assert!(token.is_expired_at(boundary, 60));
        assert_eq!(token.expires_at(), created + Duration::seconds(3600));
    }

    #[test]
    fn refresh_needed_requires_refresh_token() {
        let mut token = token_at(Utc::now() - Duration::seconds(7200), 3600);
        assert!(token.is_refresh_needed());
        token.refresh_token = None;
        assert!(token.is_expired());
        assert!(!token.is_refresh_needed());
    }

    /// Validates `OAuthToken::refresh` behavior for the partial response
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms `refresh_count` increases by exactly one.
    /// - Confirms the refresh token and scope are preserved when omitted.
    /// - Confirms the token type defaults to `Bearer`.
    #[test]
    fn refresh_preserves_missing_fields() {
        let old = token_at(Utc::now() - Duration::seconds(4000), 3600);
        let response = TokenResponse {
            access_token: Some("new-access-token".into()),
            expires_in: Some(1800),
            ..TokenResponse::default()
        };

        let new = old.refresh(response).unwrap();
        assert_eq!(new.refresh_count, old.refresh_count + 1);
        assert_eq!(new.refresh_token, old.refresh_token);
        assert_eq!(new.scope, "read");
        assert_eq!(new.token_type, "Bearer");
        assert_eq!(new.refreshed_at, Some(new.created_at));
        assert!(!new.is_expired());
    }

    #[test]
    fn refresh_rejects_missing_access_token() {
        let old = token_at(Utc::now(), 3600);
        let err = old.refresh(TokenResponse { expires_in: Some(10), ..Default::default() });
        assert!(matches!(err, Err(TuneLinkError::OAuth { .. })));
    }

    #[test]
    fn exchange_requires_core_fields() {
        let complete = TokenResponse {
            access_token: Some("a".repeat(20)),
            token_type: Some("Bearer".into()),
            expires_in: Some(3600),
            refresh_token: None,
            scope: None,
        };
        let token = OAuthToken::from_exchange(complete.clone(), "default scope").unwrap();
        assert_eq!(token.scope, "default scope");
        assert_eq!(token.refresh_count, 0);

        let missing = TokenResponse { token_type: None, ..complete };
        let err = OAuthToken::from_exchange(missing, "s").unwrap_err();
        assert_eq!(err.error_code(), "oauth_error");
        assert!(err.to_string().contains("token_type"));
    }

    /// Validates `OAuthToken::from_exchange` behavior for the unbounded
    /// lifetime scenario.
    ///
    /// Assertions:
    /// - Confirms negative and absurdly large `expires_in` are rejected as
    ///   `invalid_response` before any expiry arithmetic runs.
    /// - Confirms a one-year lifetime is still accepted.
    #[test]
    fn exchange_rejects_out_of_range_lifetime() {
        let response = |expires_in| TokenResponse {
            access_token: Some("a".repeat(20)),
            token_type: Some("Bearer".into()),
            expires_in: Some(expires_in),
            ..TokenResponse::default()
        };

        for bad in [i64::MAX, i64::MIN, -1, MAX_TOKEN_LIFETIME_SECS + 1] {
            let err = OAuthToken::from_exchange(response(bad), "s").unwrap_err();
            assert!(
                matches!(&err, TuneLinkError::OAuth { error, .. } if error == "invalid_response"),
                "expires_in {bad} gave {err:?}"
            );
        }

        let year = OAuthToken::from_exchange(response(MAX_TOKEN_LIFETIME_SECS), "s").unwrap();
        assert!(!year.is_expired());

        let old = token_at(Utc::now(), 3600);
        assert!(old.refresh(response(i64::MAX)).is_err());
    }

    #[test]
    fn expiry_math_saturates_for_stored_garbage() {
        let huge = token_at(Utc::now(), i64::MAX);
        assert_eq!(huge.expires_at(), DateTime::<Utc>::MAX_UTC);
        assert!(!huge.is_expired());

        let negative = token_at(Utc::now(), i64::MIN);
        assert!(negative.is_expired());

        let mut session = UserSession::new(None, None);
        session.authorize(huge, None);
        assert!(matches!(session.validate(), Err(TuneLinkError::Storage(_))));
    }

    #[test]
    fn debug_redacts_tokens() {
        let token = token_at(Utc::now(), 3600);
        let debug = format!("{token:?}");
        assert!(!debug.contains("access-abcdefghijk"));
        assert!(debug.contains("access-a..."));
    }

    #[test]
    fn new_session_is_pending_with_pkce() {
        let session = UserSession::new(Some("127.0.0.1".into()), None);
        assert_eq!(session.state, AuthState::Pending);
        assert!(session.pkce.is_some());
        assert_eq!(session.session_id.len(), 43);
        assert!(!session.is_authenticated());
        assert!(session.validate().is_ok());
    }

    #[test]
    fn oauth_state_embeds_session_id() {
        let session = UserSession::new(None, None);
        let state = session.oauth_state.clone().unwrap();
        assert_eq!(state.len(), 86);
        assert_eq!(UserSession::id_from_state(&state), Some(session.session_id.as_str()));
        assert_ne!(state, UserSession::new(None, None).oauth_state.unwrap());
        assert_eq!(UserSession::id_from_state("short"), None);
    }

    #[test]
    fn authorize_consumes_pkce() {
        let mut session = UserSession::new(None, None);
        session.authorize(token_at(Utc::now(), 3600), Some("user-1".into()));
        assert_eq!(session.state, AuthState::Authorized);
        assert!(session.pkce.is_none());
        assert!(session.oauth_state.is_none());
        assert!(session.is_authenticated());
        assert_eq!(session.user_id.as_deref(), Some("user-1"));
    }

    #[test]
    fn session_idle_expiry() {
        let session = UserSession::new(None, None);
        let later = session.last_accessed + Duration::seconds(3600);
        assert!(!session.is_expired_at(later, 3600));
        assert!(session.is_expired_at(later + Duration::seconds(1), 3600));
    }

    /// Validates `UserSession::increment_request_count_at` behavior for the
    /// coarse window reset scenario.
    ///
    /// Assertions:
    /// - Confirms counts accumulate within the window.
    /// - Confirms `is_rate_limited_at` trips at the maximum.
    /// - Confirms an elapsed window resets the counter.
    #[test]
    fn coarse_counter_window() {
        let mut session = UserSession::new(None, None);
        let now = session.created_at;

        session.increment_request_count_at(now);
        session.increment_request_count_at(now);
        assert_eq!(session.request_count, 2);
        assert!(session.is_rate_limited_at(now, 2));
        assert!(!session.is_rate_limited_at(now, 3));

        let later = now + Duration::seconds(61);
        assert!(!session.is_rate_limited_at(later, 2));
        assert_eq!(session.request_count, 0);

        session.increment_request_count_at(later + Duration::seconds(120));
        assert_eq!(session.request_count, 1);
    }

    #[test]
    fn auth_state_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&AuthState::Authorized).unwrap(), "\"authorized\"");
        assert_eq!("REVOKED".parse::<AuthState>().unwrap(), AuthState::Revoked);
    }

    #[test]
    fn validate_rejects_authorized_without_token() {
        let mut session = UserSession::new(None, None);
        session.state = AuthState::Authorized;
        assert!(matches!(session.validate(), Err(TuneLinkError::Storage(_))));
    }

    #[test]
    fn token_key_is_hex_sha256() {
        let key = token_key("abc");
        assert_eq!(key, "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
        assert_ne!(token_key("abc"), token_key("abd"));
    }
}
