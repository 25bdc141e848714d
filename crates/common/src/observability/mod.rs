//! In-process metrics for the auth service
//!
//! Counters are lock-free atomics; latency samples live in a bounded ring
//! buffer behind a poison-recovering mutex. Keyed breakdowns (error types,
//! rate limit violations, per-session activity) use `DashMap`.

pub mod metrics;

pub use metrics::{
    AuthMetrics, FlowCounts, MetricsSummary, RequestCounts, SessionMetricsSnapshot,
};
