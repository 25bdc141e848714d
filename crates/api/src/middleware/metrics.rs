//! Request metrics.
//!
//! Records duration and outcome of every request. The outcome comes from
//! response extensions: [`ErrorCode`] for rendered errors and
//! [`ResponseSession`] for requests that authenticated.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tokio::time::Instant;

use crate::context::AppState;
use crate::error::ErrorCode;

/// Session that served an authenticated request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSession(pub String);

fn outcome(response: &Response) -> Option<&'static str> {
    match response.extensions().get::<ErrorCode>() {
        Some(ErrorCode(code)) => Some(*code),
        None if response.status().is_client_error() || response.status().is_server_error() => {
            Some("http_error")
        }
        None => None,
    }
}

pub async fn metrics_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let started = Instant::now();
    let response = next.run(request).await;

    let session = response.extensions().get::<ResponseSession>().map(|s| s.0.as_str());
    state.metrics.record_request(session, started.elapsed(), outcome(&response));
    response
}
