//! Client configuration

use crate::error::{Error, Result};
use crate::provider_keys::ProviderKeys;
use crate::retry::RetryPolicy;
use crate::types::KeyMode;
use dotenvy::dotenv;
use secrecy::{ExposeSecret, SecretString};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Service address used when nothing else is configured
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default number of retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// `User-Agent` sent with every request
pub const USER_AGENT: &str = concat!("tokenrouter-rust/", env!("CARGO_PKG_VERSION"));

/// Environment variable names
pub mod env_vars {
    /// TokenRouter API key
    pub const API_KEY: &str = "TOKENROUTER_API_KEY";
    /// Base URL override
    pub const BASE_URL: &str = "TOKENROUTER_BASE_URL";
    /// Timeout in seconds
    pub const TIMEOUT: &str = "TOKENROUTER_TIMEOUT";
    /// Retries after the first attempt
    pub const MAX_RETRIES: &str = "TOKENROUTER_MAX_RETRIES";
    /// Key mode applied to native route calls that set none
    pub const KEY_MODE: &str = "TOKENROUTER_KEY_MODE";
}

/// TokenRouter client configuration
#[derive(Clone)]
pub struct ClientConfig {
    /// TokenRouter API key
    pub api_key: SecretString,
    /// Service base URL
    pub base_url: Url,
    /// Per-request timeout
    pub timeout: Duration,
    /// Retry behaviour for the request phase
    pub retry: RetryPolicy,
    /// Extra headers sent with every request
    pub default_headers: BTreeMap<String, String>,
    /// Key mode for native route calls that do not set one
    pub default_key_mode: Option<KeyMode>,
    /// Provider keys available for inline encryption
    pub provider_keys: ProviderKeys,
}

impl ClientConfig {
    /// Configuration with `api_key` and defaults for everything else
    ///
    /// A blank key is an authentication error.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::authentication(format!(
                "API key is required. Set {} or pass it explicitly.",
                env_vars::API_KEY
            )));
        }

        Ok(Self {
            api_key: SecretString::from(api_key),
            base_url: parse_base_url(DEFAULT_BASE_URL)?,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default().with_max_retries(DEFAULT_MAX_RETRIES),
            default_headers: BTreeMap::new(),
            default_key_mode: None,
            provider_keys: ProviderKeys::new(),
        })
    }

    /// Configuration from the process environment
    ///
    /// Loads `.env` if present. Provider keys are discovered here, once,
    /// unless the default key mode is `stored`.
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let api_key = read(env_vars::API_KEY).unwrap_or_default();
        let mut config = Self::new(api_key)?;

        if let Some(base_url) = read(env_vars::BASE_URL) {
            config.base_url = parse_base_url(&base_url)?;
        }

        if let Some(timeout) = read(env_vars::TIMEOUT) {
            let seconds: f64 = timeout.trim().parse().map_err(|_| {
                Error::config(format!("{} must be a number of seconds, got {timeout:?}", env_vars::TIMEOUT))
            })?;
            if !seconds.is_finite() || seconds <= 0.0 {
                return Err(Error::config(format!(
                    "{} must be positive, got {timeout:?}",
                    env_vars::TIMEOUT
                )));
            }
            config.timeout = Duration::from_secs_f64(seconds);
        }

        if let Some(retries) = read(env_vars::MAX_RETRIES) {
            let retries: u32 = retries.trim().parse().map_err(|_| {
                Error::config(format!(
                    "{} must be a non-negative integer, got {retries:?}",
                    env_vars::MAX_RETRIES
                ))
            })?;
            config.retry.max_retries = retries;
        }

        if let Some(mode) = read(env_vars::KEY_MODE) {
            let mode: KeyMode = mode
                .parse()
                .map_err(|e: Error| Error::config(format!("{}: {e}", env_vars::KEY_MODE)))?;
            config.default_key_mode = Some(mode);
        }

        if config.default_key_mode.map_or(true, |mode| mode.uses_local_keys()) {
            config.provider_keys = ProviderKeys::from_lookup(|var| read(var));
        }

        Ok(config)
    }

    /// Set the base URL
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the number of retries after the first attempt
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.retry.max_retries = max_retries;
        self
    }

    /// Replace the retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Add a header sent with every request
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    /// Set the key mode used by native route calls that set none
    pub fn with_default_key_mode(mut self, key_mode: KeyMode) -> Self {
        self.default_key_mode = Some(key_mode);
        self
    }

    /// Set the provider keys available for inline encryption
    pub fn with_provider_keys(mut self, provider_keys: ProviderKeys) -> Self {
        self.provider_keys = provider_keys;
        self
    }

    /// Get the API key as a string
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    /// Absolute URL of `path` below the base URL
    pub fn endpoint_url(&self, path: &str) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}{path}"))
            .map_err(|e| Error::config(format!("invalid endpoint URL for {path}: {e}")))
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| Error::config(format!("invalid base URL {raw:?}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::config(format!(
            "base URL must be http or https, got {raw:?}"
        )));
    }
    Ok(url)
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"***REDACTED***")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("default_headers", &self.default_headers.keys().collect::<Vec<_>>())
            .field("default_key_mode", &self.default_key_mode)
            .field("provider_keys", &self.provider_keys)
            .finish()
    }
}
