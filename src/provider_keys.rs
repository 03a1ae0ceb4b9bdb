//! Provider credential discovery
//!
//! Credentials are read once, when a client is built, and then handed around
//! explicitly. Nothing in the request path touches the environment.

use secrecy::{ExposeSecret, SecretString};
use std::collections::BTreeMap;
use std::fmt;

/// Provider name and the environment variable holding its API key
///
/// Earlier entries win when a provider is listed twice.
pub const PROVIDER_ENV_VARS: &[(&str, &str)] = &[
    ("openai", "OPENAI_API_KEY"),
    ("anthropic", "ANTHROPIC_API_KEY"),
    ("google", "GEMINI_API_KEY"),
    ("google", "GOOGLE_API_KEY"),
    ("mistral", "MISTRAL_API_KEY"),
    ("deepseek", "DEEPSEEK_API_KEY"),
    ("meta", "LLAMA_API_KEY"),
    ("xai", "XAI_API_KEY"),
];

/// Canonical provider name as the service expects it
pub fn normalize_provider(name: &str) -> String {
    let name = name.trim().to_lowercase();
    match name.as_str() {
        "gemini" => "google".to_string(),
        "llama" => "meta".to_string(),
        _ => name,
    }
}

/// Locally held provider API keys, by canonical provider name
#[derive(Clone, Default)]
pub struct ProviderKeys {
    keys: BTreeMap<String, SecretString>,
}

impl ProviderKeys {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Discover keys from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Discover keys through `lookup`, called once per variable in
    /// [`PROVIDER_ENV_VARS`]
    pub fn from_lookup<F>(mut lookup: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut keys = Self::new();
        for (provider, var) in PROVIDER_ENV_VARS {
            if keys.contains(provider) {
                continue;
            }
            if let Some(value) = lookup(var) {
                keys.insert(provider, value);
            }
        }
        keys
    }

    /// Add or replace a key; blank values are ignored
    pub fn insert(&mut self, provider: &str, key: impl Into<String>) {
        let key = key.into();
        if key.trim().is_empty() {
            return;
        }
        let provider = normalize_provider(provider);
        if provider.is_empty() {
            return;
        }
        self.keys.insert(provider, SecretString::from(key));
    }

    /// Builder form of [`ProviderKeys::insert`]
    pub fn with_key(mut self, provider: &str, key: impl Into<String>) -> Self {
        self.insert(provider, key);
        self
    }

    /// Whether a key is held for `provider`
    pub fn contains(&self, provider: &str) -> bool {
        self.keys.contains_key(&normalize_provider(provider))
    }

    /// Whether no key is held
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Number of providers with a key
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Provider names, sorted
    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    /// Compact JSON object of provider name to plaintext key
    pub(crate) fn to_plaintext_json(&self) -> serde_json::Result<String> {
        let exposed: BTreeMap<&str, &str> = self
            .keys
            .iter()
            .map(|(provider, key)| (provider.as_str(), key.expose_secret()))
            .collect();
        serde_json::to_string(&exposed)
    }
}

impl fmt::Debug for ProviderKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderKeys")
            .field("providers", &self.keys.keys().collect::<Vec<_>>())
            .finish()
    }
}
