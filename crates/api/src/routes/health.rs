//! Health check and metrics endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use tunelink_common::MetricsSummary;
use tunelink_core::SessionStats;

use crate::context::AppState;

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `ok` or `degraded`
    pub status: String,
    pub version: String,
    pub storage: StorageHealth,
    pub sessions: SessionCounts,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StorageHealth {
    pub backend: String,
    pub healthy: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionCounts {
    pub active: usize,
    pub authenticated: usize,
}

impl From<SessionStats> for SessionCounts {
    fn from(stats: SessionStats) -> Self {
        Self { active: stats.active_sessions, authenticated: stats.authenticated_sessions }
    }
}

/// `GET /metrics` - request, flow and rate limit counters since start.
pub async fn metrics_handler(State(state): State<AppState>) -> Json<MetricsSummary> {
    Json(state.metrics.summary())
}

/// `GET /health` - liveness plus storage reachability. Answers 503 when the
/// storage backend is down.
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let healthy = match state.health_check().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Storage health check failed");
            false
        }
    };

    let status = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    let body = HealthResponse {
        status: if healthy { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        storage: StorageHealth { backend: state.storage.backend_name().to_string(), healthy },
        sessions: state.session_manager.stats().into(),
        timestamp: Utc::now(),
    };
    (status, Json(body))
}
