//! Mock provider for testing
//!
//! Scriptable accounts, transactions and failure modes for all provider
//! operations. Useful for unit tests and for exercising the orchestrator's
//! retry and degradation paths without a network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::{Error, Result};
use crate::models::{FinancialAccount, IntegrationStatus, NewTransaction, Provider};

use super::ProviderBackend;

/// Failure mode injected into mock calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Credential rejected upstream
    AuthExpired,
    /// Transient network/5xx failure
    Unavailable,
    /// 429 with an optional provider-supplied delay (seconds)
    RateLimited(Option<u64>),
}

impl MockFailure {
    fn to_error(self, provider: Provider) -> Error {
        match self {
            MockFailure::AuthExpired => Error::AuthExpired(provider.to_string()),
            MockFailure::Unavailable => {
                Error::ProviderUnavailable(format!("{} mock outage", provider))
            }
            MockFailure::RateLimited(retry_after) => Error::RateLimited { retry_after },
        }
    }
}

/// Mock provider backend
///
/// By default returns empty, successful responses. `failing_forever` makes
/// every call fail; `failing_n` fails the first n calls then succeeds,
/// which exercises the orchestrator's retry/backoff path.
#[derive(Clone)]
pub struct MockProvider {
    provider: Provider,
    accounts: Arc<Vec<FinancialAccount>>,
    transactions: Arc<Vec<NewTransaction>>,
    failure: Option<MockFailure>,
    fail_remaining: Arc<AtomicUsize>,
    rejects_token: Option<Arc<str>>,
    calls: Arc<AtomicUsize>,
}

impl MockProvider {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            accounts: Arc::new(Vec::new()),
            transactions: Arc::new(Vec::new()),
            failure: None,
            fail_remaining: Arc::new(AtomicUsize::new(0)),
            rejects_token: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_accounts(mut self, accounts: Vec<FinancialAccount>) -> Self {
        self.accounts = Arc::new(accounts);
        self
    }

    pub fn with_transactions(mut self, transactions: Vec<NewTransaction>) -> Self {
        self.transactions = Arc::new(transactions);
        self
    }

    /// Every call fails with the given mode
    pub fn failing_forever(mut self, failure: MockFailure) -> Self {
        self.failure = Some(failure);
        self.fail_remaining = Arc::new(AtomicUsize::new(usize::MAX));
        self
    }

    /// The first `n` calls fail, the rest succeed
    pub fn failing_n(mut self, failure: MockFailure, n: usize) -> Self {
        self.failure = Some(failure);
        self.fail_remaining = Arc::new(AtomicUsize::new(n));
        self
    }

    /// Calls presenting this access token fail with `AuthExpired`; any
    /// other token succeeds. Simulates a credential revoked upstream
    /// before its stored expiry.
    pub fn rejecting_token(mut self, token: &str) -> Self {
        self.rejects_token = Some(Arc::from(token));
        self
    }

    /// Total calls observed across all operations
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn gate(&self, access_token: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(rejected) = &self.rejects_token {
            if access_token == rejected.as_ref() {
                return Err(Error::AuthExpired(self.provider.to_string()));
            }
        }
        if let Some(failure) = self.failure {
            let remaining = self.fail_remaining.load(Ordering::SeqCst);
            if remaining > 0 {
                if remaining != usize::MAX {
                    self.fail_remaining.fetch_sub(1, Ordering::SeqCst);
                }
                return Err(failure.to_error(self.provider));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ProviderBackend for MockProvider {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn get_accounts(&self, access_token: &str) -> Result<Vec<FinancialAccount>> {
        self.gate(access_token)?;
        Ok(self.accounts.as_ref().clone())
    }

    async fn get_transactions(
        &self,
        access_token: &str,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<Vec<NewTransaction>> {
        self.gate(access_token)?;
        Ok(self
            .transactions
            .iter()
            .filter(|t| t.posted_date >= start && end.map_or(true, |e| t.posted_date <= e))
            .cloned()
            .collect())
    }

    async fn get_account_transactions(
        &self,
        access_token: &str,
        provider_account_id: &str,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<Vec<NewTransaction>> {
        let txns = self.get_transactions(access_token, start, end).await?;
        Ok(txns
            .into_iter()
            .filter(|t| t.provider_account_id == provider_account_id)
            .collect())
    }

    async fn refresh_balances(&self, access_token: &str) -> Result<Vec<FinancialAccount>> {
        self.get_accounts(access_token).await
    }

    async fn get_status(&self, access_token: &str) -> IntegrationStatus {
        match self.gate(access_token) {
            Ok(()) => IntegrationStatus::Connected,
            Err(Error::AuthExpired(_)) => IntegrationStatus::NeedsReauth,
            Err(e) => IntegrationStatus::Error(e.to_string()),
        }
    }
}
