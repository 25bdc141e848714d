//! # TuneLink Infrastructure
//!
//! Infrastructure implementations of core domain ports.
//!
//! This crate contains:
//! - Configuration loading (environment and JSON/TOML files)
//! - Encrypted token storage (in-memory and Redis)
//! - The reqwest OAuth provider client
//! - Logging initialisation
//!
//! ## Architecture
//! - Implements traits defined in `tunelink-core`
//! - Depends on `tunelink-common`, `tunelink-domain` and `tunelink-core`
//! - Contains all "impure" code (network, Redis, filesystem)

pub mod config;
pub mod errors;
pub mod oauth;
pub mod observability;
pub mod storage;

// Re-export commonly used items
pub use errors::InfraError;
pub use oauth::OAuthManager;
pub use observability::init_logging;
pub use storage::{build_storage, MemoryTokenStorage, RedisTokenStorage};
