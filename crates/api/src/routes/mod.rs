//! API routes.

pub mod health;
pub mod oauth;

pub use health::{health_handler, metrics_handler, HealthResponse};
pub use oauth::{
    authorize_handler, refresh_handler, revoke_handler, session_handler, token_handler,
    AuthorizeResponse, RevokeResponse, TokenResponseBody,
};
