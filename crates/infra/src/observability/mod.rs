//! Observability wiring for the service process.

pub mod logging;

pub use logging::{build_filter, init_logging};
