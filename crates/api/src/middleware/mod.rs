//! Request middleware.
//!
//! Layer order on protected routes, outermost first:
//! security headers, metrics, request guard, bearer authentication, rate
//! limiting.
//! Public OAuth routes swap the last two for the per-address limit.

pub mod auth;
pub mod guard;
pub mod metrics;
pub mod rate_limit;
pub mod security_headers;

pub use auth::{auth_middleware, AuthenticatedSession};
pub use guard::{request_guard_middleware, ClientInfo};
pub use metrics::{metrics_middleware, ResponseSession};
pub use rate_limit::{client_rate_limit_middleware, rate_limit_middleware};
pub use security_headers::security_headers_middleware;
