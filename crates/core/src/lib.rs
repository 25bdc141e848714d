//! # TuneLink Core
//!
//! Session and authorization logic with no infrastructure dependencies.
//!
//! This crate contains:
//! - Port interfaces for token storage and the OAuth provider
//! - [`SessionManager`], the single writer of session and token state
//!
//! ## Architecture Principles
//! - Only depends on `tunelink-common` and `tunelink-domain`
//! - No HTTP, Redis or filesystem code
//! - All external dependencies via traits

pub mod auth;

pub use auth::ports::{OAuthProvider, TokenStorage};
pub use auth::{SessionManager, SessionManagerConfig, SessionStats};
