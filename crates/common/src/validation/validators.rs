// Field Validators - redirect URI and client IP checks
use std::net::IpAddr;

/// Trait for field validators
pub trait FieldValidator<T: ?Sized> {
    /// Validate a field value
    fn validate(&self, value: &T) -> Result<(), String>;
}

/// URL validator
///
/// Host matching compares against both the bare host and `host:port`, so an
/// allow-list entry of `localhost:8080` pins the port while `localhost`
/// accepts any.
#[derive(Debug, Clone)]
pub struct UrlValidator {
    allowed_schemes: Vec<String>,
    allowed_hosts: Vec<String>,
}

impl Default for UrlValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlValidator {
    /// Create a new URL validator accepting http and https
    pub fn new() -> Self {
        Self {
            allowed_schemes: vec!["http".to_string(), "https".to_string()],
            allowed_hosts: Vec::new(),
        }
    }

    /// Set allowed schemes
    pub fn allowed_schemes(mut self, schemes: Vec<String>) -> Self {
        self.allowed_schemes = schemes;
        self
    }

    /// Restrict hosts; an empty list accepts any host
    pub fn allowed_hosts(mut self, hosts: Vec<String>) -> Self {
        self.allowed_hosts = hosts;
        self
    }
}

impl FieldValidator<str> for UrlValidator {
    fn validate(&self, value: &str) -> Result<(), String> {
        let parsed =
            url::Url::parse(value).map_err(|e| format!("Invalid redirect URI format: {e}"))?;

        let scheme = parsed.scheme();
        if !self.allowed_schemes.iter().any(|s| s == scheme) {
            return Err("Redirect URI must use HTTPS or HTTP".to_string());
        }

        let host = parsed.host_str().unwrap_or_default();
        let netloc = match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        if !self.allowed_hosts.is_empty()
            && !self.allowed_hosts.iter().any(|allowed| allowed == host || *allowed == netloc)
        {
            return Err(format!("Domain {netloc} is not allowed"));
        }

        Ok(())
    }
}

/// IP address validator with block- and allow-lists
///
/// The block-list is consulted before the allow-list; an empty allow-list
/// accepts every address that is not blocked.
#[derive(Debug, Clone, Default)]
pub struct IpValidator {
    allowed: Vec<IpAddr>,
    blocked: Vec<IpAddr>,
}

impl IpValidator {
    /// Create a new IP validator with no restrictions
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accept addresses in this list
    pub fn allow(mut self, addrs: Vec<IpAddr>) -> Self {
        self.allowed = addrs;
        self
    }

    /// Reject addresses in this list
    pub fn block(mut self, addrs: Vec<IpAddr>) -> Self {
        self.blocked = addrs;
        self
    }
}

impl FieldValidator<str> for IpValidator {
    fn validate(&self, value: &str) -> Result<(), String> {
        let ip: IpAddr =
            value.trim().parse().map_err(|_| format!("Invalid IP address format: {value}"))?;

        if self.blocked.contains(&ip) {
            return Err(format!("IP address {value} is blocked"));
        }

        if !self.allowed.is_empty() && !self.allowed.contains(&ip) {
            return Err(format!("IP address {value} is not allowed"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for validation::validators.
    use super::*;

    #[test]
    fn test_url_validator_schemes() {
        let validator = UrlValidator::new();
        assert!(validator.validate("https://example.com/callback").is_ok());
        assert_eq!(
            validator.validate("ftp://example.com").unwrap_err(),
            "Redirect URI must use HTTPS or HTTP"
        );
        assert!(validator.validate("not a url").unwrap_err().starts_with("Invalid redirect URI"));
    }

    /// Validates `UrlValidator::allowed_hosts` behavior for the host and port
    /// matching scenario.
    ///
    /// Assertions:
    /// - Ensures a bare host entry accepts any port.
    /// - Ensures a `host:port` entry only accepts that port.
    /// - Confirms rejections name the offending `host:port`.
    #[test]
    fn test_url_validator_allowed_hosts() {
        let validator = UrlValidator::new()
            .allowed_hosts(vec!["app.example.com".to_string(), "localhost:8080".to_string()]);

        assert!(validator.validate("https://app.example.com:9443/cb").is_ok());
        assert!(validator.validate("http://localhost:8080/auth/callback").is_ok());
        assert_eq!(
            validator.validate("http://localhost:9000/cb").unwrap_err(),
            "Domain localhost:9000 is not allowed"
        );
        assert_eq!(
            validator.validate("https://evil.example.com/cb").unwrap_err(),
            "Domain evil.example.com is not allowed"
        );
    }

    #[test]
    fn test_ip_validator_block_before_allow() {
        let blocked: IpAddr = "10.0.0.5".parse().unwrap();
        let allowed: IpAddr = "192.168.1.10".parse().unwrap();
        let validator = IpValidator::new().allow(vec![allowed, blocked]).block(vec![blocked]);

        assert!(validator.validate("192.168.1.10").is_ok());
        assert_eq!(validator.validate("10.0.0.5").unwrap_err(), "IP address 10.0.0.5 is blocked");
        assert_eq!(
            validator.validate("172.16.0.1").unwrap_err(),
            "IP address 172.16.0.1 is not allowed"
        );
        assert_eq!(
            validator.validate("999.1.1.1").unwrap_err(),
            "Invalid IP address format: 999.1.1.1"
        );
    }

    #[test]
    fn test_ip_validator_accepts_v6() {
        assert!(IpValidator::new().validate("::1").is_ok());
    }
}
