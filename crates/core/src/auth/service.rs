//! Session manager - the single writer of session and token state
//!
//! Sessions live in a write-through cache backed by [`TokenStorage`]. Every
//! state transition on one session id runs under that session's async mutex,
//! so concurrent requests for the same session are serialized while distinct
//! sessions proceed in parallel. Map guards are never held across an await.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, instrument, warn};
use tunelink_common::auth::{
    token_key, validate_state, AuthState, OAuthToken, TokenKind, TokenRecord, UserSession,
};
use tunelink_common::error::{CommonError, ErrorClassification, ErrorSeverity};
use tunelink_common::{
    AuthMetrics, PeriodicTask, RateLimitStatus, SecurityValidator, SlidingWindowRateLimiter,
};
use tunelink_domain::constants::{
    METRICS_RETENTION_SECS, SESSION_CLEANUP_ERROR_COOLDOWN_SECS, SESSION_CLEANUP_INTERVAL_SECS,
    SESSION_REQUESTS_PER_MINUTE, SESSION_TIMEOUT_SECS, TOKEN_EXPIRY_BUFFER_SECS,
};
use tunelink_domain::{redact, Result, SecurityConfig, TuneLinkError};

use super::ports::{OAuthProvider, TokenStorage};

/// Session timing and coarse rate limit settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionManagerConfig {
    pub session_timeout_secs: i64,
    pub token_expiry_buffer_secs: i64,
    /// Default for the coarse per-session counter in
    /// [`SessionManager::check_rate_limit`]
    pub requests_per_minute: u32,
    pub cleanup_interval: Duration,
    pub cleanup_error_cooldown: Duration,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            session_timeout_secs: SESSION_TIMEOUT_SECS,
            token_expiry_buffer_secs: TOKEN_EXPIRY_BUFFER_SECS,
            requests_per_minute: SESSION_REQUESTS_PER_MINUTE,
            cleanup_interval: Duration::from_secs(SESSION_CLEANUP_INTERVAL_SECS),
            cleanup_error_cooldown: Duration::from_secs(SESSION_CLEANUP_ERROR_COOLDOWN_SECS),
        }
    }
}

impl From<&SecurityConfig> for SessionManagerConfig {
    fn from(config: &SecurityConfig) -> Self {
        Self {
            session_timeout_secs: config.session_timeout_secs,
            token_expiry_buffer_secs: config.token_expiry_buffer_secs,
            requests_per_minute: config.session_requests_per_minute,
            cleanup_interval: config.session_cleanup_interval(),
            ..Self::default()
        }
    }
}

/// Snapshot reported by [`SessionManager::stats`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub active_sessions: usize,
    pub authenticated_sessions: usize,
    pub storage_type: &'static str,
}

fn unknown_session() -> TuneLinkError {
    TuneLinkError::NotFound("Session not found or expired".into())
}

fn invalid_token(description: &str) -> TuneLinkError {
    TuneLinkError::oauth("invalid_token", Some(description.to_string()))
}

/// Owns session lifecycle, token indexing and lazy refresh
pub struct SessionManager {
    storage: Arc<dyn TokenStorage>,
    oauth: Arc<dyn OAuthProvider>,
    rate_limiter: Arc<SlidingWindowRateLimiter>,
    validator: SecurityValidator,
    config: SessionManagerConfig,
    cache: DashMap<String, UserSession>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    sweep: PeriodicTask,
    metrics: Arc<AuthMetrics>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("storage", &self.storage.backend_name())
            .field("cached_sessions", &self.cache.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(
        storage: Arc<dyn TokenStorage>,
        oauth: Arc<dyn OAuthProvider>,
        rate_limiter: Arc<SlidingWindowRateLimiter>,
        validator: SecurityValidator,
        config: SessionManagerConfig,
    ) -> Self {
        Self {
            storage,
            oauth,
            rate_limiter,
            validator,
            config,
            cache: DashMap::new(),
            locks: DashMap::new(),
            sweep: PeriodicTask::new("session_sweep"),
            metrics: Arc::new(AuthMetrics::new()),
        }
    }

    /// Share a metrics collector with the HTTP layer and rate limiters.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<AuthMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<AuthMetrics> {
        &self.metrics
    }

    pub fn config(&self) -> &SessionManagerConfig {
        &self.config
    }

    pub fn rate_limiter(&self) -> &Arc<SlidingWindowRateLimiter> {
        &self.rate_limiter
    }

    async fn lock_session(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(self.locks.entry(session_id.to_string()).or_default().value());
        lock.lock_owned().await
    }

    /// Create a pending session with a fresh PKCE challenge and persist it.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the session cannot be persisted.
    #[instrument(skip_all)]
    pub async fn create_session(
        &self,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Result<UserSession> {
        let session = UserSession::new(ip_address, user_agent);
        let _guard = self.lock_session(&session.session_id).await;

        self.storage.store_session(&session.session_id, &session).await?;
        self.cache.insert(session.session_id.clone(), session.clone());

        info!(session = %redact(&session.session_id), "Created session");
        Ok(session)
    }

    /// Look up a live session, touching it. Expired sessions are deleted and
    /// reported as absent.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the backend cannot be reached.
    pub async fn get_session(&self, session_id: &str) -> Result<Option<UserSession>> {
        let _guard = self.lock_session(session_id).await;
        self.get_session_unlocked(session_id).await
    }

    async fn get_session_unlocked(&self, session_id: &str) -> Result<Option<UserSession>> {
        let cached = self.cache.get(session_id).map(|entry| entry.value().clone());
        let session = match cached {
            Some(session) => Some(session),
            None => self.storage.get_session(session_id).await?,
        };

        let Some(mut session) = session else {
            return Ok(None);
        };

        if session.is_expired_at(Utc::now(), self.config.session_timeout_secs) {
            debug!(session = %redact(session_id), "Session expired on access");
            if let Err(e) = self.delete_unlocked(session_id, &session).await {
                warn!(session = %redact(session_id), error = %e, "Failed to delete expired session");
            }
            return Ok(None);
        }

        session.touch();
        self.persist(&session).await?;
        Ok(Some(session))
    }

    async fn persist(&self, session: &UserSession) -> Result<()> {
        self.storage.store_session(&session.session_id, session).await?;
        self.cache.insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    /// Attach `token` to a known session and mark it authorized.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` without side effects when the session is unknown,
    /// or a storage error if persistence fails.
    #[instrument(skip_all, fields(session = %redact(session_id)))]
    pub async fn authenticate_session(
        &self,
        session_id: &str,
        token: OAuthToken,
        user_id: Option<String>,
    ) -> Result<UserSession> {
        let _guard = self.lock_session(session_id).await;
        let session = self.get_session_unlocked(session_id).await?.ok_or_else(unknown_session)?;
        self.authenticate_unlocked(session, token, user_id).await
    }

    async fn authenticate_unlocked(
        &self,
        mut session: UserSession,
        token: OAuthToken,
        user_id: Option<String>,
    ) -> Result<UserSession> {
        let previous = session.token.take();
        session.authorize(token, user_id);
        self.persist(&session).await?;

        if let Some(previous) = previous {
            self.unindex_token(&previous).await;
        }
        self.index_token(&session).await?;

        info!(session = %redact(&session.session_id), "Session authorized");
        Ok(session)
    }

    async fn index_token(&self, session: &UserSession) -> Result<()> {
        let Some(token) = &session.token else {
            return Ok(());
        };

        let expires_at = token.expires_at();
        let access = TokenRecord {
            session_id: session.session_id.clone(),
            token_type: TokenKind::Access,
            expires_at: Some(expires_at),
        };
        let ttl = (expires_at - Utc::now()).to_std().ok();
        self.storage.store_token(&token_key(&token.access_token), &access, ttl).await?;

        if let Some(refresh_token) = &token.refresh_token {
            let refresh = TokenRecord {
                session_id: session.session_id.clone(),
                token_type: TokenKind::Refresh,
                expires_at: None,
            };
            self.storage.store_token(&token_key(refresh_token), &refresh, None).await?;
        }
        Ok(())
    }

    async fn unindex_token(&self, token: &OAuthToken) {
        let mut keys = vec![token_key(&token.access_token)];
        if let Some(refresh_token) = &token.refresh_token {
            keys.push(token_key(refresh_token));
        }
        for key in keys {
            if let Err(e) = self.storage.delete_token(&key).await {
                warn!(key = %redact(&key), error = %e, "Failed to remove token index");
            }
        }
    }

    /// Touch and persist a session.
    ///
    /// # Errors
    ///
    /// Returns a storage error if persistence fails.
    pub async fn update_session(&self, session: &UserSession) -> Result<()> {
        let _guard = self.lock_session(&session.session_id).await;
        let mut session = session.clone();
        session.touch();
        self.persist(&session).await
    }

    /// Delete a session and its token index. `true` when the session
    /// existed; repeats and storage failures report `false`.
    pub async fn delete_session(&self, session_id: &str) -> bool {
        let deleted = {
            let _guard = self.lock_session(session_id).await;
            let cached = self.cache.get(session_id).map(|entry| entry.value().clone());
            let session = match cached {
                Some(session) => Some(session),
                None => self.storage.get_session(session_id).await.ok().flatten(),
            };

            match session {
                Some(session) => match self.delete_unlocked(session_id, &session).await {
                    Ok(deleted) => deleted,
                    Err(e) => {
                        warn!(session = %redact(session_id), error = %e, "Failed to delete session");
                        false
                    }
                },
                None => false,
            }
        };

        if deleted {
            self.locks.remove(session_id);
            info!(session = %redact(session_id), "Deleted session");
        }
        deleted
    }

    async fn delete_unlocked(&self, session_id: &str, session: &UserSession) -> Result<bool> {
        let was_cached = self.cache.remove(session_id).is_some();
        if let Some(token) = &session.token {
            self.unindex_token(token).await;
        }
        self.rate_limiter.remove_session(session_id);
        self.metrics.forget_session(session_id);
        let removed = self.storage.delete_session(session_id).await?;
        Ok(removed || was_cached)
    }

    /// Admit one request for `session_id`.
    ///
    /// Unknown sessions are refused. The coarse per-session counter is
    /// checked against `max_override` (default from config) and always
    /// incremented; the sliding-window limiter is consulted only when the
    /// coarse counter allows the request.
    pub async fn check_rate_limit(&self, session_id: &str, max_override: Option<u32>) -> bool {
        self.enforce_rate_limit(session_id, max_override).await.is_ok()
    }

    /// Like [`check_rate_limit`](Self::check_rate_limit) but reports why a
    /// request was refused.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown sessions or `RateLimitExceeded` with a
    /// retry hint.
    pub async fn enforce_rate_limit(
        &self,
        session_id: &str,
        max_override: Option<u32>,
    ) -> Result<()> {
        let max = max_override.unwrap_or(self.config.requests_per_minute);

        let coarse_limited = {
            let _guard = self.lock_session(session_id).await;
            let mut session =
                self.get_session_unlocked(session_id).await?.ok_or_else(unknown_session)?;

            let limited = session.is_rate_limited(max);
            session.increment_request_count();
            if let Err(e) = self.persist(&session).await {
                warn!(session = %redact(session_id), error = %e, "Failed to persist request count");
            }
            limited
        };

        if coarse_limited {
            warn!(session = %redact(session_id), max, "Session request counter exhausted");
            return Err(TuneLinkError::rate_limited(
                format!("Session exceeded {max} requests per minute"),
                Some(60),
            ));
        }

        self.rate_limiter.check_rate_limit(session_id).await.map_err(TuneLinkError::from)
    }

    pub fn rate_limit_status(&self, session_id: &str) -> RateLimitStatus {
        self.rate_limiter.status(session_id)
    }

    /// Create a session and the provider URL that starts its authorization.
    /// The URL carries the session's `oauth_state`, which starts with the
    /// session id.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the session cannot be persisted, or a
    /// config error if the authorization URL cannot be built.
    pub async fn begin_authorization(
        &self,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Result<(UserSession, String)> {
        let session = self.create_session(ip_address, user_agent).await?;
        let (Some(pkce), Some(oauth_state)) = (&session.pkce, &session.oauth_state) else {
            return Err(TuneLinkError::Internal("New session has no PKCE challenge".into()));
        };
        let auth_url = self.oauth.generate_auth_url(pkce, oauth_state)?;
        self.metrics.record_oauth_flow_start();
        Ok((session, auth_url))
    }

    /// Finish the authorization-code flow for the session named by `state`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed or mismatched parameters,
    /// `NotFound` for an unknown state, or the provider's error from the code
    /// exchange.
    #[instrument(skip_all, fields(session = %redact(state)))]
    pub async fn complete_authorization(&self, state: &str, code: &str) -> Result<UserSession> {
        self.validator.validate_oauth_state(state)?;
        self.validator.validate_authorization_code(code)?;
        let session_id = UserSession::id_from_state(state)
            .ok_or_else(|| TuneLinkError::Validation("Invalid OAuth state".into()))?;
        self.validator.validate_session_id(session_id)?;

        let _guard = self.lock_session(session_id).await;
        let session = self.get_session_unlocked(session_id).await?.ok_or_else(unknown_session)?;

        let (AuthState::Pending, Some(expected)) = (session.state, session.oauth_state.as_deref())
        else {
            return Err(TuneLinkError::Validation(
                "Session is not awaiting authorization".into(),
            ));
        };
        if !self.oauth.validate_callback_state(state, expected) {
            return Err(TuneLinkError::Validation("OAuth state mismatch".into()));
        }
        let pkce = session
            .pkce
            .clone()
            .ok_or_else(|| TuneLinkError::Validation("Session has no PKCE challenge".into()))?;

        let authorized = match self.oauth.exchange_code_for_token(code, &pkce, state).await {
            Ok(token) => self.authenticate_unlocked(session, token, None).await,
            Err(e) => Err(e),
        };
        self.metrics.record_oauth_flow_completion(authorized.is_ok());
        authorized
    }

    /// A valid access token for the session, refreshing it when expired.
    ///
    /// Waits cooperatively for the rate limiter before touching the session.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown sessions, an OAuth `invalid_token`
    /// error when the session is not authorized or cannot be refreshed, or
    /// the provider's refresh error.
    pub async fn access_token_for(&self, session_id: &str) -> Result<String> {
        self.rate_limiter.wait_if_needed(session_id).await;

        let _guard = self.lock_session(session_id).await;
        let mut session =
            self.get_session_unlocked(session_id).await?.ok_or_else(unknown_session)?;

        if session.state != AuthState::Authorized {
            return Err(invalid_token("Session is not authorized"));
        }
        let token = session.token.clone().ok_or_else(|| invalid_token("Session has no token"))?;

        if !token.is_expired_at(Utc::now(), self.config.token_expiry_buffer_secs) {
            return Ok(token.access_token);
        }

        if token.refresh_token.is_none() {
            session.state = AuthState::Expired;
            self.persist(&session).await?;
            return Err(invalid_token("Access token expired"));
        }

        let refreshed = self.oauth.refresh_token(&token).await.map_err(|e| {
            if e.severity() >= ErrorSeverity::Error {
                error!(session = %redact(session_id), error = %e, "Token refresh failed");
            } else {
                warn!(session = %redact(session_id), error = %e, "Token refresh rejected");
            }
            e
        })?;
        let access_token = refreshed.access_token.clone();
        self.replace_token(session, token, refreshed).await?;

        info!(session = %redact(session_id), "Refreshed access token");
        Ok(access_token)
    }

    async fn replace_token(
        &self,
        mut session: UserSession,
        previous: OAuthToken,
        refreshed: OAuthToken,
    ) -> Result<UserSession> {
        session.token = Some(refreshed);
        session.state = AuthState::Authorized;
        session.touch();
        self.persist(&session).await?;
        self.unindex_token(&previous).await;
        self.index_token(&session).await?;
        Ok(session)
    }

    /// Refresh by refresh token. A token linked to a live session updates
    /// that session; an unknown one is refreshed directly with the provider.
    ///
    /// # Errors
    ///
    /// Returns the provider's refresh error or a storage error.
    pub async fn refresh_by_refresh_token(&self, refresh_token: &str) -> Result<OAuthToken> {
        let record = self.storage.get_token(&token_key(refresh_token)).await?;

        if let Some(record) = record.filter(|r| r.token_type == TokenKind::Refresh) {
            let _guard = self.lock_session(&record.session_id).await;
            if let Some(session) = self.get_session_unlocked(&record.session_id).await? {
                let linked = session.token.clone().filter(|token| {
                    token
                        .refresh_token
                        .as_deref()
                        .is_some_and(|stored| validate_state(stored, refresh_token))
                });

                if let Some(token) = linked {
                    let refreshed = self.oauth.refresh_token(&token).await?;
                    self.replace_token(session, token, refreshed.clone()).await?;
                    info!(session = %redact(&record.session_id), "Refreshed session token");
                    return Ok(refreshed);
                }
            }
        }

        debug!("Refreshing token without a linked session");
        let detached = OAuthToken::new(String::new(), Some(refresh_token.to_string()), 0, "");
        self.oauth.refresh_token(&detached).await
    }

    /// The authenticated session owning `access_token`, if any.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the backend cannot be reached.
    pub async fn resolve_bearer(&self, access_token: &str) -> Result<Option<UserSession>> {
        let Some(record) = self.storage.get_token(&token_key(access_token)).await? else {
            return Ok(None);
        };
        if record.token_type != TokenKind::Access {
            return Ok(None);
        }

        let session = self.get_session(&record.session_id).await?;
        Ok(session.filter(|session| {
            session.is_authenticated()
                && session
                    .token
                    .as_ref()
                    .is_some_and(|token| validate_state(&token.access_token, access_token))
        }))
    }

    /// Revoke the session's token with the provider (best effort), then
    /// delete the session. Returns the provider's verdict; `false` for an
    /// unknown session.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the session cannot be loaded.
    #[instrument(skip_all, fields(session = %redact(session_id)))]
    pub async fn revoke_session(&self, session_id: &str) -> Result<bool> {
        let _guard = self.lock_session(session_id).await;
        let Some(mut session) = self.get_session_unlocked(session_id).await? else {
            return Ok(false);
        };

        let revoked = match &session.token {
            Some(token) => self.oauth.revoke_token(token).await,
            None => true,
        };
        if !revoked {
            warn!(session = %redact(session_id), "Provider did not confirm token revocation");
        }

        session.state = AuthState::Revoked;
        if let Err(e) = self.delete_unlocked(session_id, &session).await {
            warn!(session = %redact(session_id), error = %e, "Failed to delete revoked session");
        }
        info!(session = %redact(session_id), revoked, "Session revoked");
        Ok(revoked)
    }

    pub fn stats(&self) -> SessionStats {
        let authenticated_sessions =
            self.cache.iter().filter(|entry| entry.value().is_authenticated()).count();
        SessionStats {
            active_sessions: self.cache.len(),
            authenticated_sessions,
            storage_type: self.storage.backend_name(),
        }
    }

    /// Delete every cached session idle past the timeout.
    ///
    /// Individual failures are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns a storage error only when every expired session failed to be
    /// deleted.
    pub async fn cleanup_expired_sessions(&self) -> Result<usize> {
        let now = Utc::now();
        let timeout = self.config.session_timeout_secs;
        let expired: Vec<String> = self
            .cache
            .iter()
            .filter(|entry| entry.value().is_expired_at(now, timeout))
            .map(|entry| entry.key().clone())
            .collect();

        self.metrics.cleanup(Duration::from_secs(METRICS_RETENTION_SECS));
        // drop locks left behind by lookups of unknown ids
        self.locks.retain(|id, lock| Arc::strong_count(lock) > 1 || self.cache.contains_key(id));

        if expired.is_empty() {
            return Ok(0);
        }

        let mut deleted = 0;
        let mut failed = 0;
        for session_id in &expired {
            let guard = self.lock_session(session_id).await;
            let current = self.cache.get(session_id).map(|entry| entry.value().clone());
            let outcome = match current {
                Some(session) if session.is_expired_at(Utc::now(), timeout) => {
                    self.delete_unlocked(session_id, &session).await
                }
                _ => Ok(false),
            };
            drop(guard);

            match outcome {
                Ok(true) => {
                    deleted += 1;
                    self.locks.remove(session_id);
                }
                Ok(false) => {}
                Err(e) => {
                    failed += 1;
                    warn!(session = %redact(session_id), error = %e, "Failed to sweep session");
                }
            }
        }

        info!(deleted, failed, "Session sweep completed");
        if deleted == 0 && failed > 0 {
            return Err(TuneLinkError::Storage(format!(
                "Session sweep failed for all {failed} expired sessions"
            )));
        }
        Ok(deleted)
    }

    /// Start the session sweep and the rate limiter cleanup.
    ///
    /// # Errors
    ///
    /// Returns an error if either task is already running.
    pub async fn start(self: &Arc<Self>) -> std::result::Result<(), CommonError> {
        let manager = Arc::downgrade(self);
        self.sweep
            .start(self.config.cleanup_interval, Some(self.config.cleanup_error_cooldown), move || {
                let manager = manager.clone();
                async move {
                    match manager.upgrade() {
                        Some(manager) => manager.cleanup_expired_sessions().await.map(|_| ()),
                        None => Ok(()),
                    }
                }
            })
            .await?;
        self.rate_limiter.start_cleanup().await
    }

    /// Stop both background tasks.
    ///
    /// # Errors
    ///
    /// Returns the first failure to stop a task cleanly.
    pub async fn stop(&self) -> std::result::Result<(), CommonError> {
        let sweep = self.sweep.stop().await;
        let cleanup = self.rate_limiter.stop_cleanup().await;
        sweep.and(cleanup)
    }

    pub async fn is_running(&self) -> bool {
        self.sweep.is_running().await
    }
}
