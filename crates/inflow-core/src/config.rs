//! Static configuration built from an external secrets source
//!
//! The token vault and provider adapters never read process-wide state ad
//! hoc: the surrounding process builds a [`SyncConfig`] once at startup from
//! a read-only key-value [`Secrets`] lookup and passes it in.
//!
//! Secret names, per provider (uppercased provider tag):
//! - `INFLOW_<PROVIDER>_API_BASE` (required to enable the provider)
//! - `INFLOW_<PROVIDER>_TOKEN_URL`
//! - `INFLOW_<PROVIDER>_CLIENT_ID`
//! - `INFLOW_<PROVIDER>_CLIENT_SECRET`

use std::collections::HashMap;

use crate::models::Provider;

/// Read-only key-value lookup by name
pub trait Secrets {
    fn get(&self, name: &str) -> Option<String>;
}

/// Secrets backed by process environment variables
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecrets;

impl Secrets for EnvSecrets {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Map-backed secrets for tests and embedding
#[derive(Debug, Clone, Default)]
pub struct StaticSecrets(HashMap<String, String>);

impl StaticSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }
}

impl Secrets for StaticSecrets {
    fn get(&self, name: &str) -> Option<String> {
        self.0.get(name).cloned()
    }
}

/// Static per-provider configuration (endpoints and client credentials)
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// Base URL for data endpoints (accounts, transactions)
    pub api_base: String,
    /// OAuth token endpoint for refresh grants
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
}

/// Configuration for the sync engine, built once at process start
#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    providers: HashMap<Provider, ProviderSettings>,
}

impl SyncConfig {
    /// Build configuration from a secrets source.
    ///
    /// A provider is enabled when its `_API_BASE` secret is present; missing
    /// companion secrets default to empty strings (some providers need no
    /// client credentials for data calls).
    pub fn from_secrets(secrets: &dyn Secrets) -> Self {
        let mut providers = HashMap::new();
        for provider in Provider::ALL {
            let prefix = format!("INFLOW_{}", provider.as_str().to_uppercase());
            let Some(api_base) = secrets.get(&format!("{}_API_BASE", prefix)) else {
                continue;
            };
            let get = |suffix: &str| secrets.get(&format!("{}_{}", prefix, suffix));
            providers.insert(
                provider,
                ProviderSettings {
                    api_base: api_base.trim_end_matches('/').to_string(),
                    token_url: get("TOKEN_URL").unwrap_or_default(),
                    client_id: get("CLIENT_ID").unwrap_or_default(),
                    client_secret: get("CLIENT_SECRET").unwrap_or_default(),
                },
            );
        }
        Self { providers }
    }

    /// Register settings for one provider explicitly (tests, embedding)
    pub fn with_provider(mut self, provider: Provider, settings: ProviderSettings) -> Self {
        self.providers.insert(provider, settings);
        self
    }

    pub fn settings(&self, provider: Provider) -> Option<&ProviderSettings> {
        self.providers.get(&provider)
    }

    pub fn configured_providers(&self) -> impl Iterator<Item = Provider> + '_ {
        self.providers.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
