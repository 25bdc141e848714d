//! Application context - dependency injection container

use std::sync::Arc;

use tracing::{info, warn};
use tunelink_common::{
    AuthMetrics, CommonError, EncryptionManager, SecurityValidator, SlidingWindowConfig,
    SlidingWindowRateLimiter,
};
use tunelink_core::{OAuthProvider, SessionManager, SessionManagerConfig, TokenStorage};
use tunelink_domain::constants::AUTHORIZE_PATH;
use tunelink_domain::{AppConfig, Result, TuneLinkError};
use tunelink_infra::{build_storage, OAuthManager};

/// Shared handle passed to every handler and middleware
pub type AppState = Arc<AppContext>;

/// Application context - holds all services and dependencies
pub struct AppContext {
    pub config: AppConfig,
    pub session_manager: Arc<SessionManager>,
    pub storage: Arc<dyn TokenStorage>,
    pub validator: SecurityValidator,
    /// Per-address budget for the public OAuth endpoints
    pub client_limiter: Arc<SlidingWindowRateLimiter>,
    /// Collector shared with the session manager and both limiters
    pub metrics: Arc<AuthMetrics>,
    /// Authorize endpoint advertised in 401 responses
    pub auth_url: String,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("storage", &self.storage.backend_name())
            .field("session_manager", &self.session_manager)
            .field("auth_url", &self.auth_url)
            .finish_non_exhaustive()
    }
}

impl AppContext {
    /// Wire every service from configuration.
    ///
    /// # Errors
    ///
    /// Returns a config error for a bad encryption key, storage settings or
    /// OAuth endpoints.
    pub fn new(config: AppConfig) -> Result<Self> {
        let encryption = Arc::new(EncryptionManager::new(&config.security.encryption_key)?);
        let storage = build_storage(&config.storage, encryption)?;
        let oauth: Arc<dyn OAuthProvider> = Arc::new(OAuthManager::new(
            config.oauth.clone(),
            config.security.max_token_refresh_attempts,
        )?);

        info!(
            storage = storage.backend_name(),
            per_minute = config.rate_limit.requests_per_minute,
            per_hour = config.rate_limit.requests_per_hour,
            burst = config.rate_limit.burst_limit,
            client_per_minute = config.security.client_requests_per_minute,
            trust_proxy = config.security.trust_proxy,
            "Application context initialised"
        );
        Self::from_parts(config, storage, oauth)
    }

    /// Assemble a context around existing storage and provider
    /// implementations.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the security section cannot produce a
    /// validator.
    pub fn from_parts(
        config: AppConfig,
        storage: Arc<dyn TokenStorage>,
        oauth: Arc<dyn OAuthProvider>,
    ) -> Result<Self> {
        let validator = SecurityValidator::from_config(&config.security)?;
        let metrics = Arc::new(AuthMetrics::new());
        let limiter = Arc::new(
            SlidingWindowRateLimiter::new(SlidingWindowConfig::from(&config.rate_limit))
                .with_metrics(Arc::clone(&metrics), "session"),
        );
        let client_limiter = Arc::new(
            SlidingWindowRateLimiter::new(SlidingWindowConfig::per_minute_only(
                config.security.client_requests_per_minute,
                config.rate_limit.cleanup_interval(),
            ))
            .with_metrics(Arc::clone(&metrics), "client"),
        );

        let session_manager = Arc::new(
            SessionManager::new(
                Arc::clone(&storage),
                oauth,
                limiter,
                validator.clone(),
                SessionManagerConfig::from(&config.security),
            )
            .with_metrics(Arc::clone(&metrics)),
        );

        let auth_url = if config.server.public_url.is_some() {
            format!("{}{AUTHORIZE_PATH}", config.server.base_url())
        } else {
            AUTHORIZE_PATH.to_string()
        };

        Ok(Self { config, session_manager, storage, validator, client_limiter, metrics, auth_url })
    }

    /// Start background sweeps.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the sweeps are already running.
    pub async fn start(&self) -> Result<()> {
        let failed =
            |e: CommonError| TuneLinkError::Internal(format!("Failed to start background tasks: {e}"));
        self.session_manager.start().await.map_err(failed)?;
        self.client_limiter.start_cleanup().await.map_err(failed)
    }

    /// Stop background sweeps; failures are logged.
    pub async fn shutdown(&self) {
        if let Err(e) = self.session_manager.stop().await {
            warn!(error = %e, "Background task did not stop cleanly");
        }
        if let Err(e) = self.client_limiter.stop_cleanup().await {
            warn!(error = %e, "Client rate limit cleanup did not stop cleanly");
        }
        info!("Application context shut down");
    }

    /// Storage backend health.
    ///
    /// # Errors
    ///
    /// Returns the backend's storage error.
    pub async fn health_check(&self) -> Result<()> {
        self.storage.health_check().await
    }
}
