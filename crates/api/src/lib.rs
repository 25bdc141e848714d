//! # TuneLink API
//!
//! HTTP boundary of the TuneLink authentication service.
//!
//! Public OAuth routes are limited per client address; protected routes per
//! session.
//!
//! - `GET /oauth/authorize` starts an authorization-code + PKCE flow
//! - `POST /oauth/token` exchanges the provider code for tokens
//! - `POST /oauth/refresh` refreshes by refresh token
//! - `POST /oauth/revoke` and `GET /oauth/session` require a bearer token
//! - `GET /health` reports storage health
//! - `GET /metrics` reports request, flow and rate limit counters

pub mod context;
pub mod error;
pub mod middleware;
pub mod routes;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Router};

pub use context::{AppContext, AppState};
pub use error::{ApiError, ApiResult};

/// Build the router with all routes and middleware.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/oauth/revoke", post(routes::revoke_handler))
        .route("/oauth/session", get(routes::session_handler))
        // Rate limiting (inner layer, needs the authenticated session)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(state.clone(), middleware::auth_middleware));

    let public = Router::new()
        .route("/oauth/authorize", get(routes::authorize_handler))
        .route("/oauth/token", post(routes::token_handler))
        .route("/oauth/refresh", post(routes::refresh_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::client_rate_limit_middleware,
        ));

    Router::new()
        .route("/health", get(routes::health_handler))
        .route("/metrics", get(routes::metrics_handler))
        .merge(public)
        .merge(protected)
        .layer(DefaultBodyLimit::max(state.validator.max_request_size()))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::request_guard_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(state.clone(), middleware::metrics_middleware))
        // Security headers (outermost, applies to rejections too)
        .layer(axum_middleware::from_fn(middleware::security_headers_middleware))
        .with_state(state)
}
