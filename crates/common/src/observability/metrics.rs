//! Request, OAuth flow and rate limit metrics
//!
//! ## Design
//! - **VecDeque ring buffer** of the last [`MAX_SAMPLES`] requests for
//!   latency percentiles and the trailing-hour count
//! - **Poison-safe locking** with an explicit match (no `.expect()`)
//! - **Per-session aggregates** dropped when the session is deleted or has
//!   been idle longer than the retention passed to [`AuthMetrics::cleanup`]
//!
//! Timestamps come from the tokio clock so tests can age samples with a
//! paused runtime.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Ring buffer capacity for request samples
pub const MAX_SAMPLES: usize = 1000;

const RECENT_WINDOW: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy)]
struct RequestSample {
    at: Instant,
    duration_ms: u64,
    success: bool,
}

#[derive(Debug, Clone, Copy)]
struct SessionActivity {
    requests: u64,
    errors: u64,
    total_duration_ms: u64,
    first_seen: Instant,
    last_seen: Instant,
}

/// Aggregate request counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestCounts {
    pub total: u64,
    pub errors: u64,
    /// Requests among the retained samples from the last hour
    pub recent_hour: u64,
    /// Fraction of successful requests, 1.0 before any traffic
    pub success_rate: f64,
    pub avg_duration_ms: f64,
    pub p50_ms: Option<u64>,
    pub p95_ms: Option<u64>,
    pub p99_ms: Option<u64>,
}

/// Authorization flow counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlowCounts {
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Snapshot returned by [`AuthMetrics::summary`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub uptime_secs: u64,
    pub requests: RequestCounts,
    pub oauth_flows: FlowCounts,
    pub errors_by_type: BTreeMap<String, u64>,
    /// Keyed `scope:window`, e.g. `session:burst` or `client:minute`
    pub rate_limit_violations: BTreeMap<String, u64>,
    pub tracked_sessions: usize,
}

/// Activity of one session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionMetricsSnapshot {
    pub requests: u64,
    pub errors: u64,
    pub avg_duration_ms: f64,
    pub age_secs: u64,
    pub idle_secs: u64,
}

/// Collector shared by the HTTP layer, the session manager and the rate
/// limiters
#[derive(Debug)]
pub struct AuthMetrics {
    started_at: Instant,
    total_requests: AtomicU64,
    total_errors: AtomicU64,
    flows_started: AtomicU64,
    flows_completed: AtomicU64,
    flows_failed: AtomicU64,
    samples: Mutex<VecDeque<RequestSample>>,
    errors_by_type: DashMap<String, u64>,
    violations: DashMap<String, u64>,
    sessions: DashMap<String, SessionActivity>,
}

impl Default for AuthMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total_requests: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            flows_started: AtomicU64::new(0),
            flows_completed: AtomicU64::new(0),
            flows_failed: AtomicU64::new(0),
            samples: Mutex::new(VecDeque::with_capacity(MAX_SAMPLES)),
            errors_by_type: DashMap::new(),
            violations: DashMap::new(),
            sessions: DashMap::new(),
        }
    }

    fn lock_samples(&self) -> MutexGuard<'_, VecDeque<RequestSample>> {
        match self.samples.lock() {
            Ok(guard) => guard,
            Err(poison_err) => {
                warn!(metric = "AuthMetrics::samples", "Mutex poisoned, recovering data");
                poison_err.into_inner()
            }
        }
    }

    /// Record one handled request. `error` is the error code of a failed
    /// request, `None` on success.
    pub fn record_request(&self, session_id: Option<&str>, duration: Duration, error: Option<&str>) {
        let now = Instant::now();
        let duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        let success = error.is_none();

        self.total_requests.fetch_add(1, Ordering::SeqCst);
        if let Some(code) = error {
            self.total_errors.fetch_add(1, Ordering::SeqCst);
            *self.errors_by_type.entry(code.to_string()).or_insert(0) += 1;
        }

        {
            let mut samples = self.lock_samples();
            samples.push_back(RequestSample { at: now, duration_ms, success });
            if samples.len() > MAX_SAMPLES {
                samples.pop_front();
            }
        }

        if let Some(id) = session_id {
            let mut activity = self.sessions.entry(id.to_string()).or_insert(SessionActivity {
                requests: 0,
                errors: 0,
                total_duration_ms: 0,
                first_seen: now,
                last_seen: now,
            });
            activity.requests += 1;
            activity.errors += u64::from(!success);
            activity.total_duration_ms = activity.total_duration_ms.saturating_add(duration_ms);
            activity.last_seen = now;
        }
    }

    pub fn record_oauth_flow_start(&self) {
        self.flows_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_oauth_flow_completion(&self, success: bool) {
        if success {
            self.flows_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.flows_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Count a rejected request; `scope` names the limiter (`session`,
    /// `client`) and `window` the window that was full.
    pub fn record_rate_limit_violation(&self, scope: &str, window: &str) {
        *self.violations.entry(format!("{scope}:{window}")).or_insert(0) += 1;
    }

    pub fn summary(&self) -> MetricsSummary {
        let now = Instant::now();
        let total = self.total_requests.load(Ordering::SeqCst);
        let errors = self.total_errors.load(Ordering::SeqCst);

        let (recent_hour, avg_duration_ms, mut durations) = {
            let samples = self.lock_samples();
            let recent = samples
                .iter()
                .filter(|s| now.saturating_duration_since(s.at) < RECENT_WINDOW)
                .count();
            let durations: Vec<u64> = samples.iter().map(|s| s.duration_ms).collect();
            let avg = if durations.is_empty() {
                0.0
            } else {
                durations.iter().sum::<u64>() as f64 / durations.len() as f64
            };
            (recent as u64, avg, durations)
        };
        durations.sort_unstable();

        let success_rate =
            if total == 0 { 1.0 } else { total.saturating_sub(errors) as f64 / total as f64 };

        MetricsSummary {
            uptime_secs: now.saturating_duration_since(self.started_at).as_secs(),
            requests: RequestCounts {
                total,
                errors,
                recent_hour,
                success_rate,
                avg_duration_ms,
                p50_ms: percentile(&durations, 0.50),
                p95_ms: percentile(&durations, 0.95),
                p99_ms: percentile(&durations, 0.99),
            },
            oauth_flows: FlowCounts {
                started: self.flows_started.load(Ordering::Relaxed),
                completed: self.flows_completed.load(Ordering::Relaxed),
                failed: self.flows_failed.load(Ordering::Relaxed),
            },
            errors_by_type: collect_counts(&self.errors_by_type),
            rate_limit_violations: collect_counts(&self.violations),
            tracked_sessions: self.sessions.len(),
        }
    }

    pub fn session_metrics(&self, session_id: &str) -> Option<SessionMetricsSnapshot> {
        let now = Instant::now();
        self.sessions.get(session_id).map(|activity| SessionMetricsSnapshot {
            requests: activity.requests,
            errors: activity.errors,
            avg_duration_ms: if activity.requests == 0 {
                0.0
            } else {
                activity.total_duration_ms as f64 / activity.requests as f64
            },
            age_secs: now.saturating_duration_since(activity.first_seen).as_secs(),
            idle_secs: now.saturating_duration_since(activity.last_seen).as_secs(),
        })
    }

    pub fn forget_session(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// Drop samples and session aggregates older than `retention`. Returns
    /// the number of sessions dropped.
    pub fn cleanup(&self, retention: Duration) -> usize {
        let now = Instant::now();
        {
            let mut samples = self.lock_samples();
            while samples.front().is_some_and(|s| now.saturating_duration_since(s.at) >= retention)
            {
                samples.pop_front();
            }
        }

        let before = self.sessions.len();
        self.sessions.retain(|_, a| now.saturating_duration_since(a.last_seen) < retention);
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            debug!(removed, "Dropped idle session metrics");
        }
        removed
    }
}

/// Nearest-rank percentile over sorted samples
fn percentile(sorted: &[u64], p: f64) -> Option<u64> {
    if sorted.is_empty() {
        return None;
    }
    let index = ((sorted.len() as f64 * p) as usize).min(sorted.len() - 1);
    sorted.get(index).copied()
}

fn collect_counts(map: &DashMap<String, u64>) -> BTreeMap<String, u64> {
    map.iter().map(|entry| (entry.key().clone(), *entry.value())).collect()
}
