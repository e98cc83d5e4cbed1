//! Provider adapter abstraction
//!
//! This module provides a capability-set interface over heterogeneous
//! financial data providers. Callers hold only the capability reference,
//! never a concrete provider type.
//!
//! # Architecture
//!
//! - `ProviderBackend` trait: the operation set every provider variant
//!   implements
//! - `ProviderClient` enum: concrete wrapper providing Clone + compile-time
//!   dispatch
//! - Backend implementations: `PlaidBackend`, `TellerBackend`,
//!   `PocketsmithBackend`, `MockProvider`
//!
//! # Contract
//!
//! All methods are idempotent for identical input windows: repeated calls
//! with the same window are safe to merge. `start` is inclusive; `end = None`
//! means "up to now". Adapters are stateless per call, never retry
//! internally, and signal credential rejection as `AuthExpired` / a
//! `NeedsReauth` status rather than a fatal error — that is the trigger for
//! the token vault's reactive refresh path. Retries for transient failures
//! belong to the sync orchestrator.

mod mock;
mod plaid;
mod pocketsmith;
mod teller;

pub use mock::{MockFailure, MockProvider};
pub use plaid::PlaidBackend;
pub use pocketsmith::PocketsmithBackend;
pub use teller::TellerBackend;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::config::ProviderSettings;
use crate::error::{Error, Result};
use crate::models::{FinancialAccount, IntegrationStatus, NewTransaction, Provider};

/// Capability set exposed by every provider variant
///
/// Accounts and transactions come back normalized into the shared model
/// with `organization_id` left at 0 and `id` unset; the sync orchestrator
/// attaches organization and store identity.
#[async_trait]
pub trait ProviderBackend: Send + Sync {
    /// Which provider this backend talks to
    fn provider(&self) -> Provider;

    /// Fetch all accounts visible to the credential
    async fn get_accounts(&self, access_token: &str) -> Result<Vec<FinancialAccount>>;

    /// Fetch transactions across all accounts for a posted-date window
    async fn get_transactions(
        &self,
        access_token: &str,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<Vec<NewTransaction>>;

    /// Fetch transactions for one provider-native account id
    async fn get_account_transactions(
        &self,
        access_token: &str,
        provider_account_id: &str,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<Vec<NewTransaction>>;

    /// Re-fetch balances (same shape as `get_accounts`; balances reflect
    /// the same or later state than any earlier transaction fetch)
    async fn refresh_balances(&self, access_token: &str) -> Result<Vec<FinancialAccount>>;

    /// Probe connection health without raising on credential problems
    async fn get_status(&self, access_token: &str) -> IntegrationStatus;
}

/// Concrete provider client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
/// All variants implement the same ProviderBackend operations.
#[derive(Clone)]
pub enum ProviderClient {
    Plaid(PlaidBackend),
    Teller(TellerBackend),
    Pocketsmith(PocketsmithBackend),
    /// Scriptable in-process provider for testing
    Mock(MockProvider),
}

impl ProviderClient {
    /// Build the backend variant for a provider from its static settings
    pub fn for_provider(provider: Provider, settings: &ProviderSettings) -> Self {
        match provider {
            Provider::Plaid => ProviderClient::Plaid(PlaidBackend::new(settings)),
            Provider::Teller => ProviderClient::Teller(TellerBackend::new(settings)),
            Provider::Pocketsmith => {
                ProviderClient::Pocketsmith(PocketsmithBackend::new(settings))
            }
        }
    }

    pub fn mock(mock: MockProvider) -> Self {
        ProviderClient::Mock(mock)
    }
}

#[async_trait]
impl ProviderBackend for ProviderClient {
    fn provider(&self) -> Provider {
        match self {
            ProviderClient::Plaid(b) => b.provider(),
            ProviderClient::Teller(b) => b.provider(),
            ProviderClient::Pocketsmith(b) => b.provider(),
            ProviderClient::Mock(b) => b.provider(),
        }
    }

    async fn get_accounts(&self, access_token: &str) -> Result<Vec<FinancialAccount>> {
        match self {
            ProviderClient::Plaid(b) => b.get_accounts(access_token).await,
            ProviderClient::Teller(b) => b.get_accounts(access_token).await,
            ProviderClient::Pocketsmith(b) => b.get_accounts(access_token).await,
            ProviderClient::Mock(b) => b.get_accounts(access_token).await,
        }
    }

    async fn get_transactions(
        &self,
        access_token: &str,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<Vec<NewTransaction>> {
        match self {
            ProviderClient::Plaid(b) => b.get_transactions(access_token, start, end).await,
            ProviderClient::Teller(b) => b.get_transactions(access_token, start, end).await,
            ProviderClient::Pocketsmith(b) => b.get_transactions(access_token, start, end).await,
            ProviderClient::Mock(b) => b.get_transactions(access_token, start, end).await,
        }
    }

    async fn get_account_transactions(
        &self,
        access_token: &str,
        provider_account_id: &str,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<Vec<NewTransaction>> {
        match self {
            ProviderClient::Plaid(b) => {
                b.get_account_transactions(access_token, provider_account_id, start, end)
                    .await
            }
            ProviderClient::Teller(b) => {
                b.get_account_transactions(access_token, provider_account_id, start, end)
                    .await
            }
            ProviderClient::Pocketsmith(b) => {
                b.get_account_transactions(access_token, provider_account_id, start, end)
                    .await
            }
            ProviderClient::Mock(b) => {
                b.get_account_transactions(access_token, provider_account_id, start, end)
                    .await
            }
        }
    }

    async fn refresh_balances(&self, access_token: &str) -> Result<Vec<FinancialAccount>> {
        match self {
            ProviderClient::Plaid(b) => b.refresh_balances(access_token).await,
            ProviderClient::Teller(b) => b.refresh_balances(access_token).await,
            ProviderClient::Pocketsmith(b) => b.refresh_balances(access_token).await,
            ProviderClient::Mock(b) => b.refresh_balances(access_token).await,
        }
    }

    async fn get_status(&self, access_token: &str) -> IntegrationStatus {
        match self {
            ProviderClient::Plaid(b) => b.get_status(access_token).await,
            ProviderClient::Teller(b) => b.get_status(access_token).await,
            ProviderClient::Pocketsmith(b) => b.get_status(access_token).await,
            ProviderClient::Mock(b) => b.get_status(access_token).await,
        }
    }
}

/// Map an HTTP response status onto the error taxonomy.
///
/// 401/403 -> AuthExpired, 429 -> RateLimited (honoring Retry-After),
/// 5xx -> ProviderUnavailable. Everything else passes through.
pub(crate) fn check_response(
    provider: Provider,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(Error::AuthExpired(provider.to_string()));
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok());
        return Err(Error::RateLimited { retry_after });
    }
    if status.is_server_error() {
        return Err(Error::ProviderUnavailable(format!(
            "{} returned {}",
            provider, status
        )));
    }
    Err(Error::ProviderUnavailable(format!(
        "{} returned unexpected {}",
        provider, status
    )))
}

/// Convert a provider's decimal-dollars amount to integer cents
pub(crate) fn dollars_to_cents(dollars: f64) -> i64 {
    (dollars * 100.0).round() as i64
}

/// Derive an IntegrationStatus from a probe result
pub(crate) fn status_from_probe(result: Result<()>) -> IntegrationStatus {
    match result {
        Ok(()) => IntegrationStatus::Connected,
        Err(Error::AuthExpired(_)) => IntegrationStatus::NeedsReauth,
        Err(e) => IntegrationStatus::Error(e.to_string()),
    }
}
