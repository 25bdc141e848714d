//! Per-request validation of client metadata.
//!
//! Resolves the client IP (proxy headers when the deployment trusts its
//! proxy, otherwise the socket peer), checks it against the allow/block lists, validates the user agent and
//! rejects bodies above the configured size before any handler runs.

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::{CONTENT_LENGTH, USER_AGENT};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;
use tunelink_common::SecurityValidator;
use tunelink_domain::constants::MAX_USER_AGENT_LENGTH;

use crate::context::AppState;
use crate::error::ApiError;

const FORWARDED_FOR: &str = "x-forwarded-for";
const REAL_IP: &str = "x-real-ip";

/// Validated client metadata, available to handlers as an extension
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Client IP.
///
/// With `trust_proxy` the first `X-Forwarded-For` hop wins, then
/// `X-Real-IP`. Without it those headers are client-controlled and ignored.
/// The socket peer is the fallback either way.
fn client_ip(request: &Request<Body>, trust_proxy: bool) -> Option<String> {
    if trust_proxy {
        if let Some(ip) = proxied_ip(request.headers()) {
            return Some(ip);
        }
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

fn proxied_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(first) = header_str(headers, FORWARDED_FOR)
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        return Some(first.to_string());
    }
    header_str(headers, REAL_IP).map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Reject requests from disallowed addresses, with malformed user agents or
/// oversized bodies, and attach [`ClientInfo`].
pub async fn request_guard_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ip_address = client_ip(&request, state.config.security.trust_proxy);
    if let Some(ip) = ip_address.as_deref() {
        if let Err(e) = state.validator.validate_ip_address(ip) {
            warn!(target: "security", path = %request.uri().path(), reason = %e.reason(), "Client address rejected");
            return Err(ApiError::access_denied("Access denied"));
        }
    }

    let user_agent = match request.headers().get(USER_AGENT) {
        Some(value) => {
            let value = value
                .to_str()
                .map_err(|_| ApiError::invalid_request("User agent contains invalid characters"))?;
            state
                .validator
                .validate_user_agent(Some(value))
                .map_err(|e| ApiError::invalid_request(e.reason()))?;
            Some(SecurityValidator::sanitize_input(value, MAX_USER_AGENT_LENGTH))
        }
        None => None,
    };

    let content_length = header_str(request.headers(), CONTENT_LENGTH.as_str())
        .and_then(|value| value.trim().parse::<usize>().ok());
    state
        .validator
        .validate_request_size(content_length)
        .map_err(|e| ApiError::payload_too_large(e.reason()))?;

    request.extensions_mut().insert(ClientInfo { ip_address, user_agent });
    Ok(next.run(request).await)
}
