//! Per-session sliding-window rate limiting
//!
//! Each session gets three windows of request timestamps (burst, minute and
//! hour). A request is admitted only when all three have room. Burst
//! violations are penalised with an exponential backoff sleep before the
//! error is returned; minute and hour violations fail immediately with a
//! retry hint. Successful requests decay the violation counter by one.
//!
//! Keys are session ids for authenticated traffic and client addresses for
//! the public OAuth endpoints; [`SlidingWindowConfig::per_minute_only`]
//! builds the plain fixed-budget variant used for the latter.
//!
//! Timestamps come from the tokio clock, so tests can drive the limiter with
//! a paused runtime.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};
use tunelink_domain::RateLimitConfig;

use crate::error::{CommonError, CommonResult};
use crate::lifecycle::PeriodicTask;
use crate::observability::AuthMetrics;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

/// Limits and penalties for [`SlidingWindowRateLimiter`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlidingWindowConfig {
    pub per_minute: u32,
    pub per_hour: u32,
    pub burst_limit: u32,
    pub burst_window: Duration,
    pub max_backoff: Duration,
    pub max_backoff_exponent: u32,
    pub cleanup_interval: Duration,
}

impl Default for SlidingWindowConfig {
    fn default() -> Self {
        Self::from(&RateLimitConfig::default())
    }
}

impl From<&RateLimitConfig> for SlidingWindowConfig {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            per_minute: config.requests_per_minute,
            per_hour: config.requests_per_hour,
            burst_limit: config.burst_limit,
            burst_window: config.burst_window(),
            max_backoff: Duration::from_secs(config.max_backoff_secs),
            max_backoff_exponent: config.max_backoff_exponent,
            cleanup_interval: config.cleanup_interval(),
        }
    }
}

impl SlidingWindowConfig {
    /// A single one-minute window of `limit` requests with no burst window
    /// and no backoff sleep.
    pub fn per_minute_only(limit: u32, cleanup_interval: Duration) -> Self {
        Self {
            per_minute: limit,
            per_hour: limit.saturating_mul(60),
            burst_limit: u32::MAX,
            burst_window: Duration::from_secs(1),
            max_backoff: Duration::ZERO,
            max_backoff_exponent: 0,
            cleanup_interval,
        }
    }

    /// Backoff applied after the given number of violations:
    /// `min(max_backoff, 2^min(violations, max_backoff_exponent))` seconds.
    pub fn backoff_for(&self, violations: u32) -> Duration {
        let exponent = violations.min(self.max_backoff_exponent).min(63);
        let secs = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        Duration::from_secs(secs).min(self.max_backoff)
    }
}

#[derive(Debug, Default)]
struct SessionWindows {
    burst: VecDeque<Instant>,
    minute: VecDeque<Instant>,
    hour: VecDeque<Instant>,
    violations: u32,
}

impl SessionWindows {
    fn prune(&mut self, now: Instant, burst_window: Duration) {
        prune_window(&mut self.burst, now, burst_window);
        prune_window(&mut self.minute, now, MINUTE);
        prune_window(&mut self.hour, now, HOUR);
    }
}

fn prune_window(window: &mut VecDeque<Instant>, now: Instant, span: Duration) {
    while window.front().is_some_and(|ts| now.saturating_duration_since(*ts) >= span) {
        window.pop_front();
    }
}

/// Time until the oldest entry leaves a full window
fn time_until_slot(window: &VecDeque<Instant>, now: Instant, span: Duration) -> Duration {
    window
        .front()
        .map(|oldest| span.saturating_sub(now.saturating_duration_since(*oldest)))
        .unwrap_or_default()
}

fn count_within(window: &VecDeque<Instant>, now: Instant, span: Duration) -> usize {
    window.iter().filter(|ts| now.saturating_duration_since(**ts) < span).count()
}

enum Verdict {
    Allowed,
    Burst { backoff: Duration },
    Window { name: &'static str, limit: u32, window: Duration, retry_after: Duration },
}

/// Usage of one window for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowStatus {
    pub limit: u32,
    pub used: u32,
    pub remaining: u32,
    pub reset_in_secs: u64,
}

/// Snapshot of a session's rate limit state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitStatus {
    pub burst: WindowStatus,
    pub minute: WindowStatus,
    pub hour: WindowStatus,
    pub violations: u32,
}

/// Configured limits as reported by [`RateLimiterStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimits {
    pub per_minute: u32,
    pub per_hour: u32,
    pub burst_limit: u32,
    pub burst_window_secs: u64,
}

/// Aggregate limiter statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimiterStats {
    pub active_sessions: usize,
    pub total_violations: u64,
    pub limits: RateLimits,
}

/// Sliding-window rate limiter keyed by session id or client address
#[derive(Debug)]
pub struct SlidingWindowRateLimiter {
    config: SlidingWindowConfig,
    sessions: DashMap<String, SessionWindows>,
    cleanup: PeriodicTask,
    /// Violation sink and the scope label it is recorded under
    metrics: Option<(Arc<AuthMetrics>, &'static str)>,
}

impl Default for SlidingWindowRateLimiter {
    fn default() -> Self {
        Self::new(SlidingWindowConfig::default())
    }
}

impl SlidingWindowRateLimiter {
    pub fn new(config: SlidingWindowConfig) -> Self {
        Self {
            config,
            sessions: DashMap::new(),
            cleanup: PeriodicTask::new("rate_limit_cleanup"),
            metrics: None,
        }
    }

    /// Report violations to `metrics` as `scope:<window>`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<AuthMetrics>, scope: &'static str) -> Self {
        self.metrics = Some((metrics, scope));
        self
    }

    fn record_violation(&self, window: &str) {
        if let Some((metrics, scope)) = &self.metrics {
            metrics.record_rate_limit_violation(scope, window);
        }
    }

    pub fn config(&self) -> &SlidingWindowConfig {
        &self.config
    }

    /// Admit or reject one request for `session_id`.
    ///
    /// A burst violation sleeps the caller for the backoff before failing;
    /// only the calling task is delayed.
    ///
    /// # Errors
    ///
    /// Returns [`CommonError::RateLimitExceeded`] with a retry hint when any
    /// window is full.
    pub async fn check_rate_limit(&self, session_id: &str) -> CommonResult<()> {
        let now = Instant::now();

        // Guard is dropped before any await
        let verdict = {
            let mut entry = self.sessions.entry(session_id.to_string()).or_default();
            let windows = entry.value_mut();
            windows.prune(now, self.config.burst_window);
            self.evaluate(windows, now)
        };

        match verdict {
            Verdict::Allowed => Ok(()),
            Verdict::Burst { backoff } => {
                self.record_violation("burst");
                warn!(
                    key = %short_id(session_id),
                    backoff_secs = backoff.as_secs(),
                    "Burst rate limit exceeded"
                );
                tokio::time::sleep(backoff).await;
                Err(CommonError::rate_limit_detailed(
                    self.config.burst_limit,
                    self.config.burst_window,
                    Some(backoff),
                ))
            }
            Verdict::Window { name, limit, window, retry_after } => {
                self.record_violation(name);
                warn!(
                    key = %short_id(session_id),
                    limit,
                    window_secs = window.as_secs(),
                    "Rate limit exceeded"
                );
                Err(CommonError::rate_limit_detailed(limit, window, Some(retry_after)))
            }
        }
    }

    fn evaluate(&self, windows: &mut SessionWindows, now: Instant) -> Verdict {
        let cfg = &self.config;

        if windows.burst.len() >= cfg.burst_limit as usize {
            windows.violations = windows.violations.saturating_add(1);
            return Verdict::Burst { backoff: cfg.backoff_for(windows.violations) };
        }

        if windows.minute.len() >= cfg.per_minute as usize {
            windows.violations = windows.violations.saturating_add(1);
            return Verdict::Window {
                name: "minute",
                limit: cfg.per_minute,
                window: MINUTE,
                retry_after: time_until_slot(&windows.minute, now, MINUTE),
            };
        }

        if windows.hour.len() >= cfg.per_hour as usize {
            windows.violations = windows.violations.saturating_add(1);
            return Verdict::Window {
                name: "hour",
                limit: cfg.per_hour,
                window: HOUR,
                retry_after: time_until_slot(&windows.hour, now, HOUR),
            };
        }

        windows.burst.push_back(now);
        windows.minute.push_back(now);
        windows.hour.push_back(now);
        windows.violations = windows.violations.saturating_sub(1);
        Verdict::Allowed
    }

    /// Sleep until the burst and minute windows have room. Never fails and
    /// records nothing.
    pub async fn wait_if_needed(&self, session_id: &str) {
        let delay = {
            let Some(mut entry) = self.sessions.get_mut(session_id) else {
                return;
            };
            let now = Instant::now();
            let windows = entry.value_mut();
            windows.prune(now, self.config.burst_window);

            let mut delay = Duration::ZERO;
            if windows.burst.len() >= self.config.burst_limit as usize {
                delay = delay.max(time_until_slot(&windows.burst, now, self.config.burst_window));
            }
            if windows.minute.len() >= self.config.per_minute as usize {
                delay = delay.max(time_until_slot(&windows.minute, now, MINUTE));
            }
            delay
        };

        if !delay.is_zero() {
            debug!(
                session = %short_id(session_id),
                delay_ms = delay.as_millis() as u64,
                "Waiting for rate limit window"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Current usage for a session; unknown sessions report empty windows.
    pub fn status(&self, session_id: &str) -> RateLimitStatus {
        let now = Instant::now();
        let cfg = &self.config;

        let window_status = |window: Option<&VecDeque<Instant>>, limit: u32, span: Duration| {
            let (used, reset_in) = match window {
                Some(w) => {
                    let live: VecDeque<Instant> = w
                        .iter()
                        .copied()
                        .filter(|ts| now.saturating_duration_since(*ts) < span)
                        .collect();
                    (count_within(w, now, span), time_until_slot(&live, now, span))
                }
                None => (0, Duration::ZERO),
            };
            let used = u32::try_from(used).unwrap_or(u32::MAX);
            WindowStatus {
                limit,
                used,
                remaining: limit.saturating_sub(used),
                reset_in_secs: reset_in.as_secs(),
            }
        };

        match self.sessions.get(session_id) {
            Some(entry) => RateLimitStatus {
                burst: window_status(Some(&entry.burst), cfg.burst_limit, cfg.burst_window),
                minute: window_status(Some(&entry.minute), cfg.per_minute, MINUTE),
                hour: window_status(Some(&entry.hour), cfg.per_hour, HOUR),
                violations: entry.violations,
            },
            None => RateLimitStatus {
                burst: window_status(None, cfg.burst_limit, cfg.burst_window),
                minute: window_status(None, cfg.per_minute, MINUTE),
                hour: window_status(None, cfg.per_hour, HOUR),
                violations: 0,
            },
        }
    }

    pub fn stats(&self) -> RateLimiterStats {
        let total_violations = self.sessions.iter().map(|e| u64::from(e.violations)).sum();
        RateLimiterStats {
            active_sessions: self.sessions.len(),
            total_violations,
            limits: RateLimits {
                per_minute: self.config.per_minute,
                per_hour: self.config.per_hour,
                burst_limit: self.config.burst_limit,
                burst_window_secs: self.config.burst_window.as_secs(),
            },
        }
    }

    /// Purge timestamps outside their windows and drop sessions with no
    /// activity in the last hour. Returns the number of sessions dropped.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, windows| {
            windows.prune(now, self.config.burst_window);
            !windows.hour.is_empty()
        });
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            debug!(removed, remaining = self.sessions.len(), "Rate limit cleanup completed");
        }
        removed
    }

    /// Forget all state for a session
    pub fn remove_session(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// Run [`Self::cleanup_expired`] every `cleanup_interval`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cleanup task is already running.
    pub async fn start_cleanup(self: &Arc<Self>) -> CommonResult<()> {
        let limiter = Arc::downgrade(self);
        self.cleanup
            .start(self.config.cleanup_interval, None, move || {
                let limiter = limiter.clone();
                async move {
                    if let Some(limiter) = limiter.upgrade() {
                        limiter.cleanup_expired();
                    }
                    Ok::<(), CommonError>(())
                }
            })
            .await
    }

    /// Stop the cleanup task.
    ///
    /// # Errors
    ///
    /// Returns an error if the task panicked or failed to stop in time.
    pub async fn stop_cleanup(&self) -> CommonResult<()> {
        self.cleanup.stop().await
    }

    pub async fn is_cleanup_running(&self) -> bool {
        self.cleanup.is_running().await
    }
}

fn short_id(id: &str) -> String {
    tunelink_domain::redact(id)
}
