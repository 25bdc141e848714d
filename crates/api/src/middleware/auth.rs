//! Bearer authentication for protected routes.
//!
//! The access token is looked up through its hashed index; the owning
//! session must be authorized and hold exactly that token.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::debug;
use tunelink_common::UserSession;
use tunelink_domain::constants::AUTH_REALM;
use tunelink_domain::redact;

use super::metrics::ResponseSession;
use crate::context::AppState;
use crate::error::{ApiError, ErrorCode};

/// The session that owns the presented bearer token
#[derive(Debug, Clone)]
pub struct AuthenticatedSession(pub UserSession);

/// Body of a 401 response, pointing the client at the authorize endpoint
#[derive(Debug, Serialize)]
struct UnauthorizedBody<'a> {
    error: &'static str,
    error_description: &'a str,
    auth_type: &'static str,
    auth_url: &'a str,
}

fn unauthorized(auth_url: &str, description: &str) -> Response {
    let body = UnauthorizedBody {
        error: "unauthorized",
        error_description: description,
        auth_type: "oauth2",
        auth_url,
    };
    let challenge = format!("Bearer realm=\"{AUTH_REALM}\", error=\"invalid_token\"");

    let mut response = (StatusCode::UNAUTHORIZED, Json(body)).into_response();
    response.extensions_mut().insert(ErrorCode("unauthorized"));
    if let Ok(value) = HeaderValue::from_str(&challenge) {
        response.headers_mut().insert(WWW_AUTHENTICATE, value);
    }
    response
}

fn bearer_token(request: &Request<Body>) -> Option<&str> {
    let value = request.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Authentication middleware function.
///
/// Resolves the bearer token and injects [`AuthenticatedSession`] into
/// request extensions. The response is tagged with the session id.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&request) else {
        return unauthorized(&state.auth_url, "Authentication required");
    };

    let session = match state.session_manager.resolve_bearer(token).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            debug!(token = %redact(token), "Bearer token not recognised");
            return unauthorized(&state.auth_url, "Invalid or expired access token");
        }
        Err(e) => return ApiError::from(e).into_response(),
    };

    let session_id = session.session_id.clone();
    request.extensions_mut().insert(AuthenticatedSession(session));
    let mut response = next.run(request).await;
    response.extensions_mut().insert(ResponseSession(session_id));
    response
}

#[cfg(test)]
mod tests {
    //! Unit tests for middleware::auth.
    use axum::body::to_bytes;

    use super::*;

    fn request(authorization: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/oauth/session");
        if let Some(value) = authorization {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        assert_eq!(bearer_token(&request(Some("Bearer abc"))), Some("abc"));
        assert_eq!(bearer_token(&request(Some("bearer abc"))), Some("abc"));
        assert_eq!(bearer_token(&request(Some("Basic abc"))), None);
        assert_eq!(bearer_token(&request(Some("Bearer "))), None);
        assert_eq!(bearer_token(&request(None)), None);
    }

    /// Validates `unauthorized` behavior for the challenge response
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms the status is 401 with a Bearer challenge naming the realm.
    /// - Confirms the body advertises the OAuth2 authorize endpoint.
    #[tokio::test]
    async fn unauthorized_response_carries_challenge() {
        let response = unauthorized("/oauth/authorize", "Authentication required");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.extensions().get::<ErrorCode>(), Some(&ErrorCode("unauthorized")));
        assert_eq!(
            response.headers()[WWW_AUTHENTICATE],
            "Bearer realm=\"tunelink\", error=\"invalid_token\""
        );

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"], "unauthorized");
        assert_eq!(json["error_description"], "Authentication required");
        assert_eq!(json["auth_type"], "oauth2");
        assert_eq!(json["auth_url"], "/oauth/authorize");
    }
}
