//! Token vault: OAuth credential lifecycle per (organization, provider)
//!
//! State machine per key: Absent -> Active -> Expiring -> Refreshing ->
//! Active on success, or Refreshing -> Invalid (terminal, requires user
//! re-authorization). `Active`/`Invalid` are persisted rows; `Expiring` and
//! `Refreshing` are transient.
//!
//! Refresh is single-flighted per key: concurrent callers take a keyed lock,
//! and whoever acquires it second re-reads the store and reuses the first
//! refresh's outcome — the replaced record, or its terminal failure —
//! instead of hitting the token endpoint again.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{IntegrationTokens, Provider, TokenStatus};

/// Default safety margin before expiry at which a token is refreshed
pub const DEFAULT_REFRESH_MARGIN_SECS: i64 = 300;

type Key = (i64, Provider);

pub struct TokenVault {
    db: Database,
    http: reqwest::Client,
    config: SyncConfig,
    refresh_margin: Duration,
    // Keyed locks for single-flight refresh; the inner mutex is held for
    // the duration of one refresh, the outer only to look up the entry
    inflight: Mutex<HashMap<Key, std::sync::Arc<Mutex<()>>>>,
}

impl TokenVault {
    pub fn new(db: Database, config: SyncConfig) -> Self {
        Self {
            db,
            http: reqwest::Client::new(),
            config,
            refresh_margin: Duration::seconds(DEFAULT_REFRESH_MARGIN_SECS),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    /// Store tokens from an initial link (or a user re-authorization)
    pub fn store(
        &self,
        organization_id: i64,
        provider: Provider,
        tokens: &IntegrationTokens,
    ) -> Result<()> {
        self.db.replace_tokens(organization_id, provider, tokens)
    }

    /// Current tokens for a key, refreshing first when inside the expiry
    /// safety margin. An absent or invalid record surfaces `AuthExpired`.
    pub async fn get(&self, organization_id: i64, provider: Provider) -> Result<IntegrationTokens> {
        let (tokens, status) = self
            .db
            .get_tokens(organization_id, provider)?
            .ok_or_else(|| Error::AuthExpired(provider.to_string()))?;

        if status == TokenStatus::Invalid {
            return Err(Error::AuthExpired(provider.to_string()));
        }
        if !self.is_expiring(&tokens) {
            return Ok(tokens);
        }

        debug!(
            provider = provider.as_str(),
            organization_id, "Token inside expiry margin, refreshing"
        );
        self.refresh(organization_id, provider, &tokens.access_token)
            .await
    }

    /// Exchange the refresh token at the provider's token endpoint and
    /// atomically replace the stored record. `seen_access_token` is the
    /// access token the caller found stale or rejected; a stored record
    /// that still carries it has not been refreshed yet, so the exchange
    /// proceeds even when the vault believes the token is live (the
    /// reactive path: an upstream rejected a token before its expiry).
    ///
    /// Serialized per (organization, provider): a concurrent caller waits on
    /// the keyed lock and then reuses the first refresh's outcome — the
    /// replaced record on success, `AuthExpired` without a second endpoint
    /// call when the record was marked invalid. Transient endpoint failures
    /// leave the record untouched.
    pub async fn refresh(
        &self,
        organization_id: i64,
        provider: Provider,
        seen_access_token: &str,
    ) -> Result<IntegrationTokens> {
        let key_lock = {
            let mut inflight = self.inflight.lock().await;
            inflight
                .entry((organization_id, provider))
                .or_insert_with(|| std::sync::Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = key_lock.lock().await;

        // Re-read after acquiring: the refresh we queued behind may have
        // already settled this key, either way
        match self.db.get_tokens(organization_id, provider)? {
            Some((_, TokenStatus::Invalid)) => {
                debug!(
                    provider = provider.as_str(),
                    organization_id, "Concurrent refresh already failed terminally"
                );
                return Err(Error::AuthExpired(provider.to_string()));
            }
            Some((tokens, TokenStatus::Active)) if tokens.access_token != seen_access_token => {
                debug!(
                    provider = provider.as_str(),
                    organization_id, "Reusing refresh completed by concurrent caller"
                );
                return Ok(tokens);
            }
            _ => {}
        }

        self.refresh_locked(organization_id, provider).await
    }

    async fn refresh_locked(
        &self,
        organization_id: i64,
        provider: Provider,
    ) -> Result<IntegrationTokens> {
        let settings = self
            .config
            .settings(provider)
            .ok_or_else(|| Error::Config(format!("no settings for provider {}", provider)))?;

        let (tokens, _) = self
            .db
            .get_tokens(organization_id, provider)?
            .ok_or_else(|| Error::AuthExpired(provider.to_string()))?;

        let Some(refresh_token) = tokens.refresh_token else {
            // Nothing to exchange; terminal until the user re-links
            self.db.mark_tokens_invalid(organization_id, provider)?;
            return Err(Error::AuthExpired(provider.to_string()));
        };

        let response = self
            .http
            .post(&settings.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", settings.client_id.as_str()),
                ("client_secret", settings.client_secret.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status.is_client_error() {
            // Revoked or expired refresh token: terminal per provider
            warn!(
                provider = provider.as_str(),
                organization_id,
                %status,
                "Refresh token rejected, marking integration invalid"
            );
            self.db.mark_tokens_invalid(organization_id, provider)?;
            return Err(Error::AuthExpired(provider.to_string()));
        }
        if !status.is_success() {
            return Err(Error::ProviderUnavailable(format!(
                "token endpoint for {} returned {}",
                provider, status
            )));
        }

        let grant: TokenGrantResponse = response.json().await?;
        let refreshed = IntegrationTokens {
            access_token: grant.access_token,
            // Providers that rotate refresh tokens send a new one; keep the
            // old one otherwise
            refresh_token: grant.refresh_token.or(Some(refresh_token)),
            expires_at: grant
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs)),
        };

        self.db
            .replace_tokens(organization_id, provider, &refreshed)?;
        info!(
            provider = provider.as_str(),
            organization_id, "Token refreshed"
        );
        Ok(refreshed)
    }

    fn is_expiring(&self, tokens: &IntegrationTokens) -> bool {
        match tokens.expires_at {
            Some(expires_at) => expires_at - self.refresh_margin <= Utc::now(),
            // No expiry supplied: treat as long-lived
            None => false,
        }
    }
}

/// OAuth refresh-grant response
#[derive(Debug, Deserialize)]
struct TokenGrantResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderSettings;
    use crate::test_utils::MockProviderServer;

    fn vault_with_server(db: &Database, server: &MockProviderServer) -> TokenVault {
        let config = SyncConfig::default().with_provider(
            Provider::Plaid,
            ProviderSettings {
                api_base: server.url(),
                token_url: format!("{}/oauth/token", server.url()),
                client_id: "client-1".to_string(),
                client_secret: "secret-1".to_string(),
            },
        );
        TokenVault::new(db.clone(), config)
    }

    fn expiring_tokens() -> IntegrationTokens {
        IntegrationTokens {
            access_token: "stale".to_string(),
            refresh_token: Some("rt-1".to_string()),
            expires_at: Some(Utc::now() + Duration::seconds(30)),
        }
    }

    #[tokio::test]
    async fn test_get_returns_fresh_token_without_refresh() {
        let db = Database::in_memory().unwrap();
        let server = MockProviderServer::start().await;
        let vault = vault_with_server(&db, &server);

        let tokens = IntegrationTokens {
            access_token: "fresh".to_string(),
            refresh_token: Some("rt-1".to_string()),
            expires_at: Some(Utc::now() + Duration::hours(2)),
        };
        vault.store(1, Provider::Plaid, &tokens).unwrap();

        let got = vault.get(1, Provider::Plaid).await.unwrap();
        assert_eq!(got.access_token, "fresh");
        assert_eq!(server.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_get_refreshes_inside_margin() {
        let db = Database::in_memory().unwrap();
        let server = MockProviderServer::start().await;
        let vault = vault_with_server(&db, &server);

        vault.store(1, Provider::Plaid, &expiring_tokens()).unwrap();

        let got = vault.get(1, Provider::Plaid).await.unwrap();
        assert_ne!(got.access_token, "stale");
        assert_eq!(server.refresh_calls(), 1);

        // The stored record was superseded, not appended
        let (stored, status) = db.get_tokens(1, Provider::Plaid).unwrap().unwrap();
        assert_eq!(stored.access_token, got.access_token);
        assert_eq!(status, TokenStatus::Active);
    }

    #[tokio::test]
    async fn test_concurrent_gets_refresh_once() {
        let db = Database::in_memory().unwrap();
        let server = MockProviderServer::start().await;
        let vault = std::sync::Arc::new(vault_with_server(&db, &server));

        vault.store(1, Provider::Plaid, &expiring_tokens()).unwrap();

        let (a, b) = tokio::join!(vault.get(1, Provider::Plaid), vault.get(1, Provider::Plaid));
        let a = a.unwrap();
        let b = b.unwrap();

        // Exactly one refresh network call; the second caller reused it
        assert_eq!(server.refresh_calls(), 1);
        assert_eq!(a.access_token, b.access_token);
    }

    #[tokio::test]
    async fn test_refresh_exchanges_even_when_token_looks_live() {
        let db = Database::in_memory().unwrap();
        let server = MockProviderServer::start().await;
        let vault = vault_with_server(&db, &server);

        // Upstream rejected this token well before its expiry; the vault
        // still considers it live
        let tokens = IntegrationTokens {
            access_token: "rejected-upstream".to_string(),
            refresh_token: Some("rt-1".to_string()),
            expires_at: Some(Utc::now() + Duration::hours(2)),
        };
        vault.store(1, Provider::Plaid, &tokens).unwrap();

        let got = vault
            .refresh(1, Provider::Plaid, "rejected-upstream")
            .await
            .unwrap();
        assert_eq!(server.refresh_calls(), 1);
        assert_ne!(got.access_token, "rejected-upstream");

        let (stored, status) = db.get_tokens(1, Provider::Plaid).unwrap().unwrap();
        assert_eq!(stored.access_token, got.access_token);
        assert_eq!(status, TokenStatus::Active);
    }

    #[tokio::test]
    async fn test_concurrent_rejected_refresh_exchanges_once() {
        let db = Database::in_memory().unwrap();
        let server = MockProviderServer::start().await;
        server.set_reject_refresh(true);
        let vault = std::sync::Arc::new(vault_with_server(&db, &server));

        vault.store(1, Provider::Plaid, &expiring_tokens()).unwrap();

        let (a, b) = tokio::join!(vault.get(1, Provider::Plaid), vault.get(1, Provider::Plaid));

        // The revoked refresh token goes to the endpoint exactly once; the
        // second caller finds the record invalid and reuses the outcome
        assert_eq!(server.refresh_calls(), 1);
        assert!(matches!(a.unwrap_err(), Error::AuthExpired(_)));
        assert!(matches!(b.unwrap_err(), Error::AuthExpired(_)));

        let (_, status) = db.get_tokens(1, Provider::Plaid).unwrap().unwrap();
        assert_eq!(status, TokenStatus::Invalid);
    }

    #[tokio::test]
    async fn test_rejected_refresh_marks_invalid() {
        let db = Database::in_memory().unwrap();
        let server = MockProviderServer::start().await;
        server.set_reject_refresh(true);
        let vault = vault_with_server(&db, &server);

        vault.store(1, Provider::Plaid, &expiring_tokens()).unwrap();

        let err = vault.get(1, Provider::Plaid).await.unwrap_err();
        assert!(matches!(err, Error::AuthExpired(_)));

        let (_, status) = db.get_tokens(1, Provider::Plaid).unwrap().unwrap();
        assert_eq!(status, TokenStatus::Invalid);

        // Terminal: subsequent gets fail without another endpoint call
        let calls_before = server.refresh_calls();
        let err = vault.get(1, Provider::Plaid).await.unwrap_err();
        assert!(matches!(err, Error::AuthExpired(_)));
        assert_eq!(server.refresh_calls(), calls_before);
    }

    #[tokio::test]
    async fn test_missing_refresh_token_is_terminal() {
        let db = Database::in_memory().unwrap();
        let server = MockProviderServer::start().await;
        let vault = vault_with_server(&db, &server);

        let tokens = IntegrationTokens {
            access_token: "stale".to_string(),
            refresh_token: None,
            expires_at: Some(Utc::now() - Duration::seconds(10)),
        };
        vault.store(1, Provider::Plaid, &tokens).unwrap();

        let err = vault.get(1, Provider::Plaid).await.unwrap_err();
        assert!(matches!(err, Error::AuthExpired(_)));
        assert_eq!(server.refresh_calls(), 0);
    }
}
