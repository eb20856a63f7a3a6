//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `BAZAAR_API_URL` - Base URL of the marketplace REST backend
//!
//! ## Optional
//! - `BAZAAR_STORAGE_DIR` - Directory for device-local state (default: .bazaar)
//! - `BAZAAR_SESSION_POLL_SECS` - Seconds between session re-checks (default: 5)
//! - `BAZAAR_HTTP_TIMEOUT_SECS` - Backend request timeout (default: 15)
//! - `BAZAAR_LOGIN_CART_POLICY` - `replace` or `merge` (default: replace)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::cart::LoginCartPolicy;

const DEFAULT_STORAGE_DIR: &str = ".bazaar";
const DEFAULT_SESSION_POLL_SECS: &str = "5";
const DEFAULT_HTTP_TIMEOUT_SECS: &str = "15";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront cart engine configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Marketplace backend connection settings
    pub api: ApiConfig,
    /// Directory holding the guest cart and stored credentials
    pub storage_dir: PathBuf,
    /// How often stored credentials are re-classified
    pub session_poll_interval: Duration,
    /// What happens to a guest cart when a buyer logs in
    pub login_cart_policy: LoginCartPolicy,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Marketplace REST backend configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL; endpoint paths are appended to it.
    pub base_url: Url,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api = ApiConfig::from_env()?;
        let storage_dir =
            PathBuf::from(get_env_or_default("BAZAAR_STORAGE_DIR", DEFAULT_STORAGE_DIR));
        let session_poll_interval = parse_seconds(
            "BAZAAR_SESSION_POLL_SECS",
            &get_env_or_default("BAZAAR_SESSION_POLL_SECS", DEFAULT_SESSION_POLL_SECS),
        )?;
        let login_cart_policy = get_env_or_default("BAZAAR_LOGIN_CART_POLICY", "replace")
            .parse::<LoginCartPolicy>()
            .map_err(|e| ConfigError::InvalidEnvVar("BAZAAR_LOGIN_CART_POLICY".to_string(), e))?;

        Ok(Self {
            api,
            storage_dir,
            session_poll_interval,
            login_cart_policy,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }
}

impl ApiConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let base_url = parse_base_url("BAZAAR_API_URL", &get_required_env("BAZAAR_API_URL")?)?;
        let timeout = parse_seconds(
            "BAZAAR_HTTP_TIMEOUT_SECS",
            &get_env_or_default("BAZAAR_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS),
        )?;
        Ok(Self { base_url, timeout })
    }

    /// Build a configuration for a known base URL with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the URL is not an absolute http(s) URL.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: parse_base_url("base_url", base_url)?,
            timeout: Duration::from_secs(15),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable, treating empty as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an absolute http(s) base URL. A trailing slash is added so
/// endpoint paths join under it instead of replacing its last segment.
fn parse_base_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = Url::parse(&format!("{trimmed}/"))
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    Ok(url)
}

/// Parse a whole number of seconds, at least one.
fn parse_seconds(key: &str, raw: &str) -> Result<Duration, ConfigError> {
    let secs = raw
        .trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if secs == 0 {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be at least 1 second".to_string(),
        ));
    }
    Ok(Duration::from_secs(secs))
}
