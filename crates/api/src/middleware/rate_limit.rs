//! Rate limiting: per session on authenticated routes, per client address on
//! the public OAuth endpoints.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;
use tunelink_domain::{redact, TuneLinkError};

use super::auth::AuthenticatedSession;
use super::guard::ClientInfo;
use crate::context::AppState;
use crate::error::ApiError;

/// Admit the request against the session's counters; runs after
/// [`auth_middleware`](super::auth_middleware).
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(AuthenticatedSession(session)) = request.extensions().get::<AuthenticatedSession>()
    else {
        return next.run(request).await;
    };
    let session_id = session.session_id.clone();

    match state.session_manager.enforce_rate_limit(&session_id, None).await {
        Ok(()) => next.run(request).await,
        Err(TuneLinkError::RateLimitExceeded { message, retry_after_secs }) => {
            warn!(
                session = %redact(&session_id),
                path = %request.uri().path(),
                retry_after_secs,
                "Rate limit exceeded"
            );
            ApiError::rate_limited(message, retry_after_secs).into_response()
        }
        Err(TuneLinkError::NotFound(_)) => {
            ApiError::invalid_grant("Session not found or expired").into_response()
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Admit the request against the caller's address budget; runs after
/// [`request_guard_middleware`](super::request_guard_middleware). Requests
/// whose address cannot be resolved pass through.
pub async fn client_rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(ip) = request.extensions().get::<ClientInfo>().and_then(|c| c.ip_address.clone())
    else {
        return next.run(request).await;
    };

    match state.client_limiter.check_rate_limit(&ip).await {
        Ok(()) => next.run(request).await,
        Err(e) => {
            warn!(
                target: "security",
                client = %redact(&ip),
                path = %request.uri().path(),
                "Client rate limit exceeded"
            );
            ApiError::from(TuneLinkError::from(e)).into_response()
        }
    }
}
