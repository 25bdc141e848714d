//! Configuration loader
//!
//! Loads service configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from `TUNELINK_*` environment variables
//! 2. If the required secrets are missing, falls back to loading from file
//! 3. Searches multiple paths for config files
//! 4. Supports JSON and TOML formats
//! 5. Validates the result (field constraints plus encryption key format)
//!
//! ## Environment Variables
//! Required:
//! - `TUNELINK_CLIENT_ID`, `TUNELINK_CLIENT_SECRET`: OAuth client registration
//! - `TUNELINK_ENCRYPTION_KEY`: base64 AES-256 key, or alternatively
//!   `TUNELINK_ENCRYPTION_PASSWORD` together with `TUNELINK_ENCRYPTION_SALT`
//!
//! Optional (defaults from [`AppConfig::default`]):
//! - `TUNELINK_REDIRECT_URI`, `TUNELINK_ALLOWED_REDIRECT_DOMAINS` (comma list)
//! - `TUNELINK_STORAGE_BACKEND` (`memory`/`redis`), `TUNELINK_REDIS_URL`
//! - `TUNELINK_RATE_LIMIT_PER_MINUTE`, `TUNELINK_RATE_LIMIT_PER_HOUR`,
//!   `TUNELINK_BURST_LIMIT`, `TUNELINK_CLIENT_REQUESTS_PER_MINUTE`
//! - `TUNELINK_TRUST_PROXY`: read client addresses from proxy headers
//! - `TUNELINK_HOST`, `TUNELINK_PORT`, `TUNELINK_PUBLIC_URL`
//! - `TUNELINK_LOG_LEVEL`, `TUNELINK_LOG_JSON`
//!
//! Setting `TUNELINK_REDIS_URL` without a backend selects Redis.
//!
//! ## File Locations
//! The loader searches the following paths (in order):
//! 1. `./config.{json,toml}` then `./tunelink.{json,toml}`
//! 2. `../config.{json,toml}` and `../../config.{json,toml}`
//! 3. The same names relative to the executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;

use tunelink_common::EncryptionManager;
use tunelink_domain::{AppConfig, LogFormat, Result, StorageBackend, TuneLinkError};

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If any required
/// variables are missing, falls back to loading from a config file. The
/// loaded configuration is validated before it is returned.
///
/// # Errors
/// Returns `TuneLinkError::Config` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
/// - Validation fails
pub fn load() -> Result<AppConfig> {
    let config = match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            config
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to load from environment, trying file");
            load_from_file(None)?
        }
    };

    validate(&config)?;
    Ok(config)
}

/// Validate a loaded configuration
///
/// Runs [`AppConfig::validate`] and checks that the encryption key decodes
/// to a usable AES-256 key.
///
/// # Errors
/// Returns `TuneLinkError::Config` describing the first problem found.
pub fn validate(config: &AppConfig) -> Result<()> {
    config.validate()?;
    EncryptionManager::new(&config.security.encryption_key).map_err(|e| {
        TuneLinkError::Config(format!("security.encryption_key is invalid: {e}"))
    })?;
    Ok(())
}

/// Load configuration from environment variables
///
/// The secrets listed in the module documentation must be present; every
/// other field falls back to its default.
///
/// # Errors
/// Returns `TuneLinkError::Config` if required variables are missing
/// or have invalid values.
pub fn load_from_env() -> Result<AppConfig> {
    let mut config = AppConfig::default();

    config.oauth.client_id = env_var("TUNELINK_CLIENT_ID")?;
    config.oauth.client_secret = env_var("TUNELINK_CLIENT_SECRET")?;
    config.security.encryption_key = encryption_key_from_env()?;

    if let Some(uri) = env_opt("TUNELINK_REDIRECT_URI") {
        config.oauth.redirect_uri = uri;
    }
    if let Some(domains) = env_opt("TUNELINK_ALLOWED_REDIRECT_DOMAINS") {
        config.security.allowed_redirect_domains = split_list(&domains);
    }

    let redis_url = env_opt("TUNELINK_REDIS_URL");
    config.storage.backend = match env_opt("TUNELINK_STORAGE_BACKEND") {
        Some(value) => StorageBackend::from_str(&value).map_err(|_| {
            TuneLinkError::Config(format!("Invalid storage backend: {value}"))
        })?,
        None if redis_url.is_some() => StorageBackend::Redis,
        None => StorageBackend::Memory,
    };
    config.storage.redis_url = redis_url;

    if let Some(value) = env_parse::<u32>("TUNELINK_RATE_LIMIT_PER_MINUTE")? {
        config.rate_limit.requests_per_minute = value;
    }
    if let Some(value) = env_parse::<u32>("TUNELINK_RATE_LIMIT_PER_HOUR")? {
        config.rate_limit.requests_per_hour = value;
    }
    if let Some(value) = env_parse::<u32>("TUNELINK_BURST_LIMIT")? {
        config.rate_limit.burst_limit = value;
    }
    if let Some(value) = env_parse::<u32>("TUNELINK_CLIENT_REQUESTS_PER_MINUTE")? {
        config.security.client_requests_per_minute = value;
    }
    config.security.trust_proxy = env_bool("TUNELINK_TRUST_PROXY", false);

    if let Some(host) = env_opt("TUNELINK_HOST") {
        config.server.host = host;
    }
    if let Some(port) = env_parse::<u16>("TUNELINK_PORT")? {
        config.server.port = port;
    }
    config.server.public_url = env_opt("TUNELINK_PUBLIC_URL");
    if let Some(level) = env_opt("TUNELINK_LOG_LEVEL") {
        config.server.log_level = level;
    }
    if env_bool("TUNELINK_LOG_JSON", false) {
        config.server.log_format = LogFormat::Json;
    }

    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, searches multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `TuneLinkError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
pub fn load_from_file(path: Option<PathBuf>) -> Result<AppConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(TuneLinkError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => search_config_paths().ok_or_else(|| {
            TuneLinkError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| TuneLinkError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content, format chosen by extension
fn parse_config(contents: &str, path: &Path) -> Result<AppConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| TuneLinkError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| TuneLinkError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(TuneLinkError::Config(format!("Unsupported config format: {extension}"))),
    }
}

const CONFIG_FILE_NAMES: [&str; 4] = ["config.json", "config.toml", "tunelink.json", "tunelink.toml"];
const PARENT_FILE_NAMES: [&str; 4] =
    ["../config.json", "../config.toml", "../../config.json", "../../config.toml"];

/// Search the standard locations for a configuration file
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn search_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd);
    }
    if let Some(exe_dir) =
        std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        roots.push(exe_dir);
    }

    roots
        .iter()
        .flat_map(|root| {
            CONFIG_FILE_NAMES.iter().chain(PARENT_FILE_NAMES.iter()).map(move |name| root.join(name))
        })
        .find(|path| path.exists())
}

fn encryption_key_from_env() -> Result<String> {
    if let Some(key) = env_opt("TUNELINK_ENCRYPTION_KEY") {
        return Ok(key);
    }

    match (env_opt("TUNELINK_ENCRYPTION_PASSWORD"), env_opt("TUNELINK_ENCRYPTION_SALT")) {
        (Some(password), Some(salt)) => {
            tracing::debug!("Deriving encryption key from password");
            EncryptionManager::derive_key_from_password(&password, &salt).map_err(Into::into)
        }
        _ => Err(TuneLinkError::Config(
            "Missing required environment variable: TUNELINK_ENCRYPTION_KEY".to_string(),
        )),
    }
}

/// Get required environment variable
///
/// # Errors
/// Returns `TuneLinkError::Config` if the variable is not set or empty.
fn env_var(key: &str) -> Result<String> {
    env_opt(key).ok_or_else(|| {
        TuneLinkError::Config(format!("Missing required environment variable: {key}"))
    })
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_opt(key)
        .map(|raw| {
            raw.parse::<T>().map_err(|e| TuneLinkError::Config(format!("Invalid {key}: {e}")))
        })
        .transpose()
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}
