//! PKCE (Proof Key for Code Exchange) primitives for OAuth 2.1
//!
//! Implements RFC 7636 with the S256 method. Session ids and OAuth `state`
//! values share the same generator: 32 random bytes, URL-safe base64 without
//! padding (43 characters).

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tunelink_domain::constants::PKCE_CHALLENGE_METHOD;
use tunelink_domain::redact;

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a code verifier: 32 random bytes, base64url (43 characters)
pub fn generate_code_verifier() -> String {
    random_token()
}

/// `BASE64URL(SHA256(ASCII(code_verifier)))` without padding
pub fn generate_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Random OAuth `state` value
pub fn generate_state() -> String {
    random_token()
}

/// Random session identifier
pub fn generate_session_id() -> String {
    random_token()
}

/// Compare a callback `state` with the expected value in constant time
pub fn validate_state(expected: &str, actual: &str) -> bool {
    expected.as_bytes().ct_eq(actual.as_bytes()).into()
}

/// PKCE verifier/challenge pair
///
/// Lives on a pending session until the code exchange consumes the verifier.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PKCEChallenge {
    /// Kept secret until token exchange
    pub code_verifier: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
}

impl PKCEChallenge {
    /// Generate a fresh challenge
    ///
    /// # Examples
    /// ```
    /// use tunelink_common::auth::pkce::{generate_code_challenge, PKCEChallenge};
    ///
    /// let challenge = PKCEChallenge::generate();
    /// assert_eq!(challenge.code_verifier.len(), 43);
    /// assert_eq!(challenge.code_challenge, generate_code_challenge(&challenge.code_verifier));
    /// ```
    pub fn generate() -> Self {
        let code_verifier = generate_code_verifier();
        let code_challenge = generate_code_challenge(&code_verifier);
        Self {
            code_verifier,
            code_challenge,
            code_challenge_method: PKCE_CHALLENGE_METHOD.to_string(),
        }
    }

    /// Check that the stored challenge still matches the verifier
    pub fn verify(&self) -> bool {
        let expected = generate_code_challenge(&self.code_verifier);
        self.code_challenge_method == PKCE_CHALLENGE_METHOD
            && validate_state(&expected, &self.code_challenge)
    }
}

impl fmt::Debug for PKCEChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PKCEChallenge")
            .field("code_verifier", &redact(&self.code_verifier))
            .field("code_challenge", &self.code_challenge)
            .field("code_challenge_method", &self.code_challenge_method)
            .finish()
    }
}
