//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `KEYHAVEN_API_BASE_URL` - Base URL of the backend API (e.g., `https://api.example.com/v1`)
//!
//! ## Optional
//! - `KEYHAVEN_STORE_PATH` - Session file location (default: `.keyhaven/session.json`)
//! - `KEYHAVEN_CACHE_CAPACITY` - Maximum cached responses (default: 500)
//! - `KEYHAVEN_TIMEOUT_SECS` - Transport timeout in seconds (default: 30)
//! - `KEYHAVEN_AUTH_ROUTE` - Route the navigation guard redirects to (default: `/auth`)
//! - `KEYHAVEN_ENDPOINT_<NAME>` - Override an endpoint path, where `<NAME>` is one of
//!   `LOGIN`, `REGISTER`, `REQUEST_OTP`, `VERIFY_OTP`, `REFRESH`, `USERS`, `PROPERTIES`

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_STORE_PATH: &str = ".keyhaven/session.json";
const DEFAULT_CACHE_CAPACITY: u64 = 500;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_AUTH_ROUTE: &str = "/auth";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Invalid base URL {0}: {1}")]
    InvalidBaseUrl(String, String),
}

/// Path suffixes for every backend endpoint, relative to the base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub login: String,
    pub register: String,
    pub request_otp: String,
    pub verify_otp: String,
    pub refresh: String,
    /// Collection path; user IDs are appended as `/{id}`.
    pub users: String,
    /// Collection path; property IDs are appended as `/{id}`.
    pub properties: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login: "/auth/login".to_string(),
            register: "/auth/register".to_string(),
            request_otp: "/auth/request-otp".to_string(),
            verify_otp: "/auth/verify-otp".to_string(),
            refresh: "/auth/refresh".to_string(),
            users: "/users".to_string(),
            properties: "/properties".to_string(),
        }
    }
}

impl Endpoints {
    /// Returns true if `path` targets an endpoint that must never carry
    /// credentials or cache validators (token refresh and OTP verification).
    #[must_use]
    pub fn is_auth_exchange(&self, path: &str) -> bool {
        path.contains(self.refresh.as_str()) || path.contains(self.verify_otp.as_str())
    }

    fn apply_overrides(
        &mut self,
        lookup: &impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let slots: [(&str, &mut String); 7] = [
            ("KEYHAVEN_ENDPOINT_LOGIN", &mut self.login),
            ("KEYHAVEN_ENDPOINT_REGISTER", &mut self.register),
            ("KEYHAVEN_ENDPOINT_REQUEST_OTP", &mut self.request_otp),
            ("KEYHAVEN_ENDPOINT_VERIFY_OTP", &mut self.verify_otp),
            ("KEYHAVEN_ENDPOINT_REFRESH", &mut self.refresh),
            ("KEYHAVEN_ENDPOINT_USERS", &mut self.users),
            ("KEYHAVEN_ENDPOINT_PROPERTIES", &mut self.properties),
        ];
        for (key, slot) in slots {
            if let Some(value) = lookup(key) {
                if value.trim().trim_matches('/').is_empty() {
                    return Err(ConfigError::InvalidEnvVar(
                        key.to_string(),
                        "endpoint path must not be empty".to_string(),
                    ));
                }
                *slot = normalize_path(&value);
            }
        }
        Ok(())
    }
}

/// Keyhaven client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL (validated)
    pub base_url: Url,
    /// Endpoint path suffixes
    pub endpoints: Endpoints,
    /// Where the persisted session lives
    pub store_path: PathBuf,
    /// Maximum number of responses kept by the response cache
    pub cache_capacity: u64,
    /// Transport timeout applied to every request
    pub timeout: Duration,
    /// Route the navigation guard redirects unauthenticated users to
    pub auth_route: String,
}

impl ClientConfig {
    /// Create a configuration with defaults for everything but the base URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidBaseUrl` if `base_url` is not an absolute
    /// http(s) URL.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            endpoints: Endpoints::default(),
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            auth_route: DEFAULT_AUTH_ROUTE.to_string(),
        })
    }

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
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_url = lookup("KEYHAVEN_API_BASE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("KEYHAVEN_API_BASE_URL".to_string()))?;
        let mut config = Self::new(&base_url)?;

        if let Some(path) = lookup("KEYHAVEN_STORE_PATH") {
            config.store_path = PathBuf::from(path);
        }
        if let Some(capacity) = lookup("KEYHAVEN_CACHE_CAPACITY") {
            config.cache_capacity = parse_number("KEYHAVEN_CACHE_CAPACITY", &capacity)?;
        }
        if let Some(secs) = lookup("KEYHAVEN_TIMEOUT_SECS") {
            config.timeout = Duration::from_secs(parse_number("KEYHAVEN_TIMEOUT_SECS", &secs)?);
        }
        if let Some(route) = lookup("KEYHAVEN_AUTH_ROUTE") {
            config.auth_route = normalize_path(&route);
        }
        config.endpoints.apply_overrides(&lookup)?;

        Ok(config)
    }

    /// Builds the absolute URL for an endpoint path.
    #[must_use]
    pub fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ConfigError::InvalidBaseUrl(raw.to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidBaseUrl(
            raw.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    Ok(url)
}

fn parse_number(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

fn normalize_path(value: &str) -> String {
    let trimmed = value.trim().trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}
