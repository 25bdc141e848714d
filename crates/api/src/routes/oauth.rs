//! OAuth endpoints: authorize, token exchange, refresh, revoke and the
//! session summary.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use tunelink_common::{AuthState, OAuthToken, RateLimitStatus, SessionMetricsSnapshot};
use tunelink_domain::{redact, TuneLinkError};

use crate::context::AppState;
use crate::error::{ApiError, ApiResult};
use crate::middleware::{AuthenticatedSession, ClientInfo};

#[derive(Debug, Default, Deserialize)]
pub struct AuthorizeQuery {
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthorizeResponse {
    #[serde(rename = "type")]
    pub kind: String,
    pub auth_url: String,
    pub state: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct TokenRequest {
    pub code: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

/// Successful token endpoint response
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponseBody {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub scope: String,
}

impl From<OAuthToken> for TokenResponseBody {
    fn from(token: OAuthToken) -> Self {
        Self {
            access_token: token.access_token,
            token_type: token.token_type,
            expires_in: token.expires_in,
            refresh_token: token.refresh_token,
            scope: token.scope,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RevokeResponse {
    pub revoked: bool,
}

#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub user_id: Option<String>,
    pub state: AuthState,
    pub authenticated: bool,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
    pub rate_limit: RateLimitStatus,
    /// Requests recorded for this session before the current one
    pub activity: Option<SessionMetricsSnapshot>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// `GET /oauth/authorize`
///
/// Starts a pending session and returns the provider URL. The provider
/// always redirects to the configured callback; a caller-supplied
/// `redirect_uri` is only checked against the allow-list.
pub async fn authorize_handler(
    State(state): State<AppState>,
    Extension(client): Extension<ClientInfo>,
    Query(query): Query<AuthorizeQuery>,
) -> ApiResult<Json<AuthorizeResponse>> {
    if let Some(redirect_uri) = query.redirect_uri.as_deref() {
        state.validator.validate_redirect_uri(redirect_uri).map_err(|e| {
            warn!(target: "security", reason = %e.reason(), "Rejected redirect URI");
            ApiError::invalid_request("Invalid redirect URI")
        })?;
    }

    let (session, auth_url) = state
        .session_manager
        .begin_authorization(client.ip_address, client.user_agent)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to start authorization");
            ApiError::authorization_error("Failed to start authorization")
        })?;

    let oauth_state = session
        .oauth_state
        .ok_or_else(|| ApiError::authorization_error("Failed to start authorization"))?;

    info!(session = %redact(&session.session_id), "Authorization started");
    Ok(Json(AuthorizeResponse { kind: "oauth".to_string(), auth_url, state: oauth_state }))
}

fn exchange_error(err: TuneLinkError) -> ApiError {
    match err {
        TuneLinkError::Validation(msg) => ApiError::invalid_grant(msg),
        TuneLinkError::NotFound(_) => ApiError::invalid_grant("Invalid or expired state"),
        TuneLinkError::OAuth { error, description } if error == "invalid_grant" => {
            ApiError::invalid_grant(
                description.unwrap_or_else(|| "Invalid authorization code".to_string()),
            )
        }
        other => {
            error!(error = %other, code = other.error_code(), "Token exchange failed");
            ApiError::server_error("Token exchange failed")
        }
    }
}

/// `POST /oauth/token`
pub async fn token_handler(
    State(state): State<AppState>,
    payload: Result<Json<TokenRequest>, JsonRejection>,
) -> ApiResult<Json<TokenResponseBody>> {
    let Json(request) =
        payload.map_err(|e| ApiError::invalid_request(format!("Invalid request body: {e}")))?;
    let (Some(code), Some(oauth_state)) = (non_empty(request.code), non_empty(request.state))
    else {
        return Err(ApiError::invalid_request("Missing code or state"));
    };

    let session = state
        .session_manager
        .complete_authorization(&oauth_state, &code)
        .await
        .map_err(exchange_error)?;

    let token = session
        .token
        .ok_or_else(|| ApiError::server_error("Token exchange failed"))?;
    Ok(Json(token.into()))
}

/// `POST /oauth/refresh`
pub async fn refresh_handler(
    State(state): State<AppState>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> ApiResult<Json<TokenResponseBody>> {
    let Json(request) =
        payload.map_err(|e| ApiError::invalid_request(format!("Invalid request body: {e}")))?;
    let Some(refresh_token) = non_empty(request.refresh_token) else {
        return Err(ApiError::invalid_request("Missing refresh_token"));
    };

    let token = state
        .session_manager
        .refresh_by_refresh_token(&refresh_token)
        .await
        .map_err(|e| {
            warn!(error = %e, refresh_token = %redact(&refresh_token), "Token refresh failed");
            ApiError::invalid_grant("Failed to refresh token")
        })?;
    Ok(Json(token.into()))
}

/// `POST /oauth/revoke`
pub async fn revoke_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedSession(session)): Extension<AuthenticatedSession>,
) -> ApiResult<Json<RevokeResponse>> {
    let revoked = state.session_manager.revoke_session(&session.session_id).await?;
    Ok(Json(RevokeResponse { revoked }))
}

/// `GET /oauth/session`
pub async fn session_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedSession(session)): Extension<AuthenticatedSession>,
) -> Json<SessionSummary> {
    let rate_limit = state.session_manager.rate_limit_status(&session.session_id);
    let activity = state.metrics.session_metrics(&session.session_id);
    let authenticated = session.is_authenticated();

    Json(SessionSummary {
        token_expires_at: session.token.as_ref().map(OAuthToken::expires_at),
        scope: session.token.as_ref().map(|token| token.scope.clone()),
        session_id: session.session_id,
        user_id: session.user_id,
        state: session.state,
        authenticated,
        created_at: session.created_at,
        last_accessed: session.last_accessed,
        rate_limit,
        activity,
    })
}
