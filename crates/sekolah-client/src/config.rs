//! Client configuration.
//!
//! # Design
//! - Everything environment-driven is read through one lookup function so
//!   tests can supply values without touching the process environment.
//! - The API base URL always ends with `/` so relative resource paths keep
//!   any deployment prefix (`https://host/backend/api/...`).

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

/// Environment variable holding the API base URL.
pub const ENV_API_URL: &str = "SEKOLAH_API_URL";
/// Environment variable holding the HTTP timeout in seconds.
pub const ENV_HTTP_TIMEOUT_SECS: &str = "SEKOLAH_HTTP_TIMEOUT_SECS";
/// Environment variable holding the list search debounce in milliseconds.
pub const ENV_SEARCH_DEBOUNCE_MS: &str = "SEKOLAH_SEARCH_DEBOUNCE_MS";
/// Environment variable holding the select lookup debounce in milliseconds.
pub const ENV_SELECT_DEBOUNCE_MS: &str = "SEKOLAH_SELECT_DEBOUNCE_MS";
/// Environment variable holding the persisted token file path.
pub const ENV_TOKEN_FILE: &str = "SEKOLAH_TOKEN_FILE";
/// Environment variable holding the social-auth entry path.
pub const ENV_SOCIAL_AUTH_PATH: &str = "SEKOLAH_SOCIAL_AUTH_PATH";

/// Default API base URL for a local backend.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/";
/// Default HTTP timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default debounce applied to list searches.
pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(500);
/// Default debounce applied to async-select lookups.
pub const DEFAULT_SELECT_DEBOUNCE: Duration = Duration::from_millis(300);
/// Default backend-hosted OAuth entry path.
pub const DEFAULT_SOCIAL_AUTH_PATH: &str = "auth/login/google-oauth2/";

/// Errors raised while assembling a [`ClientConfig`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The API base URL did not parse.
    #[error("invalid API base URL '{value}'")]
    InvalidBaseUrl {
        /// Offending value.
        value: String,
    },
    /// The API base URL uses a scheme other than http/https.
    #[error("unsupported URL scheme '{scheme}'")]
    UnsupportedScheme {
        /// Offending scheme.
        scheme: String,
    },
    /// A numeric setting did not parse.
    #[error("invalid value for {key}")]
    InvalidNumber {
        /// Environment key.
        key: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Runtime configuration for [`crate::HttpClient`] and the resource hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL every relative path is resolved against.
    pub api_base_url: Url,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Debounce window for list searches.
    pub search_debounce: Duration,
    /// Debounce window for async-select lookups.
    pub select_debounce: Duration,
    /// Where the token pair is persisted, when persistence is wanted.
    pub token_path: Option<PathBuf>,
    /// Backend-hosted OAuth entry path, relative to the base URL.
    pub social_auth_path: String,
}

impl ClientConfig {
    /// Configuration with defaults for everything but the base URL.
    #[must_use]
    pub fn new(api_base_url: Url) -> Self {
        Self {
            api_base_url: normalize_base_url(api_base_url),
            timeout: DEFAULT_TIMEOUT,
            search_debounce: DEFAULT_SEARCH_DEBOUNCE,
            select_debounce: DEFAULT_SELECT_DEBOUNCE,
            token_path: None,
            social_auth_path: DEFAULT_SOCIAL_AUTH_PATH.to_string(),
        }
    }

    /// Parse `input` as the base URL and apply defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the URL is malformed or not http(s).
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        Ok(Self::new(parse_base_url(input)?))
    }

    /// Read configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable is present but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, falling back to defaults for
    /// missing keys.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a value is present but malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base = lookup(ENV_API_URL).unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let mut config = Self::parse(&base)?;

        if let Some(secs) = read_positive(&lookup, ENV_HTTP_TIMEOUT_SECS)? {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = read_number(&lookup, ENV_SEARCH_DEBOUNCE_MS)? {
            config.search_debounce = Duration::from_millis(ms);
        }
        if let Some(ms) = read_number(&lookup, ENV_SELECT_DEBOUNCE_MS)? {
            config.select_debounce = Duration::from_millis(ms);
        }
        if let Some(path) = lookup(ENV_TOKEN_FILE).filter(|value| !value.trim().is_empty()) {
            config.token_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup(ENV_SOCIAL_AUTH_PATH).filter(|value| !value.trim().is_empty()) {
            config.social_auth_path = path.trim().trim_start_matches('/').to_string();
        }
        Ok(config)
    }

    /// Override the persisted token location.
    #[must_use]
    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = Some(path.into());
        self
    }

    /// Override the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override both debounce windows.
    #[must_use]
    pub const fn with_debounce(mut self, search: Duration, select: Duration) -> Self {
        self.search_debounce = search;
        self.select_debounce = select;
        self
    }
}

/// Parse and normalise an API base URL.
///
/// # Errors
///
/// Returns [`ConfigError`] when the URL is malformed or not http(s).
pub fn parse_base_url(input: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(input.trim()).map_err(|_| ConfigError::InvalidBaseUrl {
        value: input.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(normalize_base_url(url)),
        other => Err(ConfigError::UnsupportedScheme {
            scheme: other.to_string(),
        }),
    }
}

fn normalize_base_url(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    url
}

fn read_number(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<u64>, ConfigError> {
    lookup(key)
        .map(|value| {
            value
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidNumber { key, value })
        })
        .transpose()
}

fn read_positive(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<u64>, ConfigError> {
    match read_number(lookup, key)? {
        Some(0) => Err(ConfigError::InvalidNumber {
            key,
            value: lookup(key).unwrap_or_default(),
        }),
        other => Ok(other),
    }
}
