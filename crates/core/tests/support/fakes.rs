//! Fake port implementations
//!
//! `FakeStorage` keeps plain values in `DashMap`s and can be switched into a
//! failing mode. `FakeOAuthProvider` mints deterministic tokens and counts
//! calls. Both can be slowed down to hold a session lock across an await.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tunelink_common::auth::{
    validate_state, OAuthToken, PKCEChallenge, TokenRecord, TokenResponse, UserSession,
};
use tunelink_core::{OAuthProvider, TokenStorage};
use tunelink_domain::{Result, TuneLinkError};

#[derive(Default)]
pub struct FakeStorage {
    pub sessions: DashMap<String, UserSession>,
    pub tokens: DashMap<String, TokenRecord>,
    pub fail_writes: AtomicBool,
    pub session_deletes_started: AtomicU32,
    pub delete_delay_ms: AtomicU64,
}

impl FakeStorage {
    pub fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TuneLinkError::Storage("storage offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl TokenStorage for FakeStorage {
    async fn store_session(&self, session_id: &str, session: &UserSession) -> Result<()> {
        self.check()?;
        self.sessions.insert(session_id.to_string(), session.clone());
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<UserSession>> {
        Ok(self.sessions.get(session_id).map(|s| s.value().clone()))
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool> {
        self.session_deletes_started.fetch_add(1, Ordering::SeqCst);
        pause(&self.delete_delay_ms).await;
        self.check()?;
        Ok(self.sessions.remove(session_id).is_some())
    }

    async fn store_token(
        &self,
        key: &str,
        record: &TokenRecord,
        _ttl: Option<Duration>,
    ) -> Result<()> {
        self.check()?;
        self.tokens.insert(key.to_string(), record.clone());
        Ok(())
    }

    async fn get_token(&self, key: &str) -> Result<Option<TokenRecord>> {
        Ok(self.tokens.get(key).map(|r| r.value().clone()))
    }

    async fn delete_token(&self, key: &str) -> Result<bool> {
        self.check()?;
        Ok(self.tokens.remove(key).is_some())
    }

    fn backend_name(&self) -> &'static str {
        "fake"
    }

    async fn health_check(&self) -> Result<()> {
        self.check()
    }
}

async fn pause(delay_ms: &AtomicU64) {
    let ms = delay_ms.load(Ordering::SeqCst);
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

pub struct FakeOAuthProvider {
    pub exchanges_started: AtomicU32,
    pub exchange_delay_ms: AtomicU64,
    pub exchanges: AtomicU32,
    pub refreshes: AtomicU32,
    pub revocations: AtomicU32,
    /// Lifetime of issued access tokens
    pub expires_in: i64,
    pub include_refresh_token: AtomicBool,
    pub fail_exchange: AtomicBool,
}

impl Default for FakeOAuthProvider {
    fn default() -> Self {
        Self {
            exchanges_started: AtomicU32::new(0),
            exchange_delay_ms: AtomicU64::new(0),
            exchanges: AtomicU32::new(0),
            refreshes: AtomicU32::new(0),
            revocations: AtomicU32::new(0),
            expires_in: 3600,
            include_refresh_token: AtomicBool::new(true),
            fail_exchange: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl OAuthProvider for FakeOAuthProvider {
    fn generate_auth_url(&self, pkce: &PKCEChallenge, state: &str) -> Result<String> {
        Ok(format!(
            "https://auth.test/authorize?response_type=code&state={state}&code_challenge={}&code_challenge_method={}",
            pkce.code_challenge, pkce.code_challenge_method
        ))
    }

    async fn exchange_code_for_token(
        &self,
        code: &str,
        pkce: &PKCEChallenge,
        _state: &str,
    ) -> Result<OAuthToken> {
        self.exchanges_started.fetch_add(1, Ordering::SeqCst);
        pause(&self.exchange_delay_ms).await;
        if self.fail_exchange.load(Ordering::SeqCst) {
            return Err(TuneLinkError::oauth("invalid_grant", Some("Bad code".into())));
        }
        assert!(pkce.verify(), "exchange must receive the session's challenge");
        let n = self.exchanges.fetch_add(1, Ordering::SeqCst);
        let refresh_token = self
            .include_refresh_token
            .load(Ordering::SeqCst)
            .then(|| format!("refresh-{code}-{n}"));
        Ok(OAuthToken::new(format!("access-{code}-{n}"), refresh_token, self.expires_in, "read"))
    }

    async fn refresh_token(&self, token: &OAuthToken) -> Result<OAuthToken> {
        let Some(refresh_token) = &token.refresh_token else {
            return Err(TuneLinkError::oauth("invalid_request", Some("No refresh token".into())));
        };
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst);
        token.refresh(TokenResponse {
            access_token: Some(format!("refreshed-{refresh_token}-{n}")),
            expires_in: Some(self.expires_in),
            ..TokenResponse::default()
        })
    }

    async fn revoke_token(&self, _token: &OAuthToken) -> bool {
        self.revocations.fetch_add(1, Ordering::SeqCst);
        true
    }

    async fn validate_token(&self, token: &OAuthToken) -> bool {
        !token.is_expired()
    }

    fn validate_callback_state(&self, received: &str, expected: &str) -> bool {
        validate_state(expected, received)
    }
}
