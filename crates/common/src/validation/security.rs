//! Protocol-level validation of untrusted OAuth values.
//!
//! Every value that arrives from a client or the provider callback passes
//! through [`SecurityValidator`] before it reaches session or token logic.

use std::net::IpAddr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use once_cell::sync::Lazy;
use rand::RngCore;
use regex::Regex;
use subtle::ConstantTimeEq;
use tunelink_domain::constants::{
    MAX_REQUEST_SIZE_BYTES, MAX_USER_AGENT_LENGTH, MAX_VERIFIER_LENGTH, MIN_AUTH_CODE_LENGTH,
    MIN_STATE_LENGTH, MIN_VERIFIER_LENGTH, SESSION_ID_LENGTH,
};
use tunelink_domain::SecurityConfig;

use super::validators::{FieldValidator, IpValidator, UrlValidator};
use super::{ValidationError, ValidationResult};

#[allow(clippy::expect_used)]
static URL_SAFE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]+$").expect("URL_SAFE_TOKEN pattern is valid and well-formed")
});

#[allow(clippy::expect_used)]
static PKCE_VERIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_.~-]+$").expect("PKCE_VERIFIER pattern is valid and well-formed")
});

/// Stateless validator for OAuth protocol values and request metadata.
#[derive(Debug, Clone)]
pub struct SecurityValidator {
    redirect_validator: UrlValidator,
    ip_validator: IpValidator,
    max_request_size: usize,
}

impl Default for SecurityValidator {
    fn default() -> Self {
        Self::from_parts(Vec::new(), IpValidator::new(), MAX_REQUEST_SIZE_BYTES)
    }
}

impl SecurityValidator {
    /// Build a validator from the security section of the service config.
    ///
    /// # Errors
    /// Returns a `ValidationError` when an entry of `allowed_ips` or
    /// `blocked_ips` is not an IP address.
    pub fn from_config(config: &SecurityConfig) -> ValidationResult<Self> {
        let allowed = parse_ip_list("allowed_ips", &config.allowed_ips)?;
        let blocked = parse_ip_list("blocked_ips", &config.blocked_ips)?;
        Ok(Self::from_parts(
            config.allowed_redirect_domains.clone(),
            IpValidator::new().allow(allowed).block(blocked),
            config.max_request_size,
        ))
    }

    fn from_parts(
        allowed_redirect_domains: Vec<String>,
        ip_validator: IpValidator,
        max_request_size: usize,
    ) -> Self {
        Self {
            redirect_validator: UrlValidator::new().allowed_hosts(allowed_redirect_domains),
            ip_validator,
            max_request_size,
        }
    }

    /// `state` must be present, at least 32 characters, URL-safe.
    pub fn validate_oauth_state(&self, state: &str) -> ValidationResult<()> {
        if state.is_empty() {
            return Err(ValidationError::field("state", "OAuth state parameter is required"));
        }
        if state.len() < MIN_STATE_LENGTH {
            return Err(ValidationError::field("state", "OAuth state parameter too short"));
        }
        if !URL_SAFE_TOKEN.is_match(state) {
            return Err(ValidationError::field("state", "OAuth state contains invalid characters"));
        }
        Ok(())
    }

    /// Authorization `code` must be present, at least 10 characters, URL-safe.
    pub fn validate_authorization_code(&self, code: &str) -> ValidationResult<()> {
        if code.is_empty() {
            return Err(ValidationError::field("code", "OAuth authorization code is required"));
        }
        if code.len() < MIN_AUTH_CODE_LENGTH {
            return Err(ValidationError::field("code", "OAuth authorization code too short"));
        }
        if !URL_SAFE_TOKEN.is_match(code) {
            return Err(ValidationError::field(
                "code",
                "OAuth authorization code contains invalid characters",
            ));
        }
        Ok(())
    }

    /// PKCE verifier: 43 to 128 characters from the RFC 7636 unreserved set.
    pub fn validate_code_verifier(&self, verifier: &str) -> ValidationResult<()> {
        if verifier.is_empty() {
            return Err(ValidationError::field("code_verifier", "PKCE code verifier is required"));
        }
        if !(MIN_VERIFIER_LENGTH..=MAX_VERIFIER_LENGTH).contains(&verifier.len()) {
            return Err(ValidationError::field(
                "code_verifier",
                "PKCE code verifier length must be 43-128 characters",
            ));
        }
        if !PKCE_VERIFIER.is_match(verifier) {
            return Err(ValidationError::field(
                "code_verifier",
                "PKCE code verifier contains invalid characters",
            ));
        }
        Ok(())
    }

    pub fn validate_redirect_uri(&self, redirect_uri: &str) -> ValidationResult<()> {
        if redirect_uri.is_empty() {
            return Err(ValidationError::field("redirect_uri", "Redirect URI is required"));
        }
        self.redirect_validator
            .validate(redirect_uri)
            .map_err(|message| ValidationError::field("redirect_uri", message))
    }

    pub fn validate_session_id(&self, session_id: &str) -> ValidationResult<()> {
        if session_id.is_empty() {
            return Err(ValidationError::field("session_id", "Session ID is required"));
        }
        if session_id.len() != SESSION_ID_LENGTH || !URL_SAFE_TOKEN.is_match(session_id) {
            return Err(ValidationError::field("session_id", "Invalid session ID format"));
        }
        Ok(())
    }

    pub fn validate_ip_address(&self, ip: &str) -> ValidationResult<()> {
        self.ip_validator
            .validate(ip)
            .map_err(|message| ValidationError::field("ip_address", message))
    }

    /// User agent is optional; when present it must be short printable ASCII.
    pub fn validate_user_agent(&self, user_agent: Option<&str>) -> ValidationResult<()> {
        let Some(user_agent) = user_agent else {
            return Ok(());
        };
        if user_agent.len() > MAX_USER_AGENT_LENGTH {
            return Err(ValidationError::field("user_agent", "User agent string too long"));
        }
        if !user_agent.bytes().all(|b| (32..=126).contains(&b)) {
            return Err(ValidationError::field(
                "user_agent",
                "User agent contains invalid characters",
            ));
        }
        Ok(())
    }

    /// A missing content length is accepted.
    pub fn validate_request_size(&self, content_length: Option<usize>) -> ValidationResult<()> {
        match content_length {
            Some(size) if size > self.max_request_size => Err(ValidationError::field(
                "content_length",
                format!("Request size {size} exceeds limit {}", self.max_request_size),
            )),
            _ => Ok(()),
        }
    }

    pub fn max_request_size(&self) -> usize {
        self.max_request_size
    }

    /// Truncate to `max_length` characters, drop control characters, trim.
    pub fn sanitize_input(input: &str, max_length: usize) -> String {
        let truncated: String =
            input.chars().take(max_length).filter(|c| !c.is_control()).collect();
        truncated.trim().to_string()
    }

    /// URL-safe base64 of `num_bytes` random bytes.
    pub fn generate_secure_token(num_bytes: usize) -> String {
        let mut bytes = vec![0u8; num_bytes];
        rand::thread_rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Compare two secrets without short-circuiting on the first mismatch.
    pub fn constant_time_eq(a: &str, b: &str) -> bool {
        a.as_bytes().ct_eq(b.as_bytes()).into()
    }
}

fn parse_ip_list(field: &str, entries: &[String]) -> ValidationResult<Vec<IpAddr>> {
    entries
        .iter()
        .map(|entry| {
            entry.trim().parse::<IpAddr>().map_err(|_| {
                ValidationError::field(field, format!("Invalid IP address format: {entry}"))
            })
        })
        .collect()
}
