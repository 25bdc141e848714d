//! OAuth 2.1 authorization-code + PKCE building blocks
//!
//! - **[`pkce`]**: verifier/challenge generation, state and session ids
//! - **[`types`]**: tokens, sessions and the records persisted for them
//!
//! Network flows live behind the `OAuthProvider` port in `tunelink-core`;
//! this module only holds the data and pure functions both sides share.

pub mod pkce;
pub mod types;

pub use pkce::{
    generate_code_challenge, generate_code_verifier, generate_session_id, generate_state,
    validate_state, PKCEChallenge,
};
pub use types::{
    token_key, AuthState, OAuthErrorResponse, OAuthToken, TokenKind, TokenRecord, TokenResponse,
    UserSession,
};
