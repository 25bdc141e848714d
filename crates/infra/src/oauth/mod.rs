//! OAuth provider client.

pub mod manager;

pub use manager::OAuthManager;
