//! # TuneLink Domain
//!
//! Domain error taxonomy, configuration structures and constants for the
//! TuneLink authentication service.
//!
//! ## Architecture
//! - No dependencies on other TuneLink crates
//! - Only external dependencies allowed
//! - Pure data structures, no I/O

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
