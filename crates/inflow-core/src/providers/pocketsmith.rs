//! Pocketsmith-style budgeting-platform backend
//!
//! GET-based API with Bearer authentication, scoped under a user resource
//! that has to be resolved first. Transactions arrive already categorized
//! by the platform, so their splits carry higher confidence than the
//! bank-linking providers' machine categories. Amounts are decimal dollars
//! with negative already meaning outflow. No location data.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::config::ProviderSettings;
use crate::error::{Error, Result};
use crate::models::{
    fingerprint, normalize_merchant, CategorySplit, FinancialAccount, IntegrationStatus,
    NewTransaction, Provider,
};

use super::{check_response, dollars_to_cents, status_from_probe, ProviderBackend};

/// Confidence attached to platform-curated categories
const CURATED_CONFIDENCE: f64 = 85.0;

#[derive(Clone)]
pub struct PocketsmithBackend {
    http: reqwest::Client,
    api_base: String,
}

impl PocketsmithBackend {
    pub fn new(settings: &ProviderSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: settings.api_base.trim_end_matches('/').to_string(),
        }
    }

    async fn get(&self, access_token: &str, path: &str) -> Result<reqwest::Response> {
        let response = self
            .http
            .get(format!("{}{}", self.api_base, path))
            .bearer_auth(access_token)
            .send()
            .await?;
        check_response(Provider::Pocketsmith, response)
    }

    /// The API is scoped per user; resolve the credential's user id first
    async fn user_id(&self, access_token: &str) -> Result<i64> {
        let me: WireUser = self.get(access_token, "/me").await?.json().await?;
        Ok(me.id)
    }

    async fn fetch_accounts(&self, access_token: &str) -> Result<Vec<FinancialAccount>> {
        let user_id = self.user_id(access_token).await?;
        let wire: Vec<WireAccount> = self
            .get(access_token, &format!("/users/{}/transaction_accounts", user_id))
            .await?
            .json()
            .await?;

        let now = Utc::now();
        Ok(wire
            .into_iter()
            .map(|a| FinancialAccount {
                id: 0,
                organization_id: 0,
                provider: Provider::Pocketsmith,
                provider_account_id: a.id.to_string(),
                name: a.name,
                account_type: a
                    .account_type
                    .parse()
                    .unwrap_or(crate::models::AccountType::Checking),
                balance_cents: dollars_to_cents(a.current_balance.unwrap_or(0.0)),
                currency: a
                    .currency_code
                    .map(|c| c.to_uppercase())
                    .unwrap_or_else(|| "USD".to_string()),
                last_synced_at: Some(now),
            })
            .collect())
    }

    async fn fetch_transactions(
        &self,
        access_token: &str,
        account_filter: Option<&str>,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<Vec<NewTransaction>> {
        let user_id = self.user_id(access_token).await?;
        let end = end.unwrap_or_else(|| Utc::now().date_naive());
        let wire: Vec<WireTransaction> = self
            .get(
                access_token,
                &format!(
                    "/users/{}/transactions?start_date={}&end_date={}",
                    user_id, start, end
                ),
            )
            .await?
            .json()
            .await?;

        let mut transactions = Vec::with_capacity(wire.len());
        for t in wire {
            if let Some(filter) = account_filter {
                if t.transaction_account_id.to_string() != filter {
                    continue;
                }
            }
            match normalize_transaction(t) {
                Ok(tx) => transactions.push(tx),
                Err(e) => {
                    warn!(provider = "pocketsmith", error = %e, "Skipping malformed transaction");
                }
            }
        }
        Ok(transactions)
    }
}

#[async_trait]
impl ProviderBackend for PocketsmithBackend {
    fn provider(&self) -> Provider {
        Provider::Pocketsmith
    }

    async fn get_accounts(&self, access_token: &str) -> Result<Vec<FinancialAccount>> {
        self.fetch_accounts(access_token).await
    }

    async fn get_transactions(
        &self,
        access_token: &str,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<Vec<NewTransaction>> {
        self.fetch_transactions(access_token, None, start, end).await
    }

    async fn get_account_transactions(
        &self,
        access_token: &str,
        provider_account_id: &str,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<Vec<NewTransaction>> {
        self.fetch_transactions(access_token, Some(provider_account_id), start, end)
            .await
    }

    async fn refresh_balances(&self, access_token: &str) -> Result<Vec<FinancialAccount>> {
        self.fetch_accounts(access_token).await
    }

    async fn get_status(&self, access_token: &str) -> IntegrationStatus {
        let probe = self.get(access_token, "/me").await.map(|_| ());
        status_from_probe(probe)
    }
}

fn normalize_transaction(t: WireTransaction) -> Result<NewTransaction> {
    let posted_date: NaiveDate = t
        .date
        .parse()
        .map_err(|_| Error::Validation(format!("unparseable date '{}' on {}", t.date, t.id)))?;
    let amount_cents = dollars_to_cents(t.amount);
    let provider_transaction_id = t.id.to_string();
    let provider_account_id = t.transaction_account_id.to_string();

    let splits = match t.category {
        Some(c) => vec![CategorySplit::full(c.title, CURATED_CONFIDENCE)],
        None => vec![CategorySplit::full("Uncategorized", 0.0)],
    };

    Ok(NewTransaction {
        fingerprint: fingerprint(
            Provider::Pocketsmith,
            &provider_transaction_id,
            &provider_account_id,
            amount_cents,
            posted_date,
        ),
        organization_id: 0,
        provider: Provider::Pocketsmith,
        provider_transaction_id,
        provider_account_id,
        amount_cents,
        posted_date,
        merchant_normalized: normalize_merchant(&t.payee),
        merchant_raw: t.payee,
        location: None,
        splits,
    })
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct WireAccount {
    id: i64,
    name: String,
    #[serde(rename = "type")]
    account_type: String,
    current_balance: Option<f64>,
    currency_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireTransaction {
    id: i64,
    transaction_account_id: i64,
    amount: f64,
    date: String,
    payee: String,
    category: Option<WireCategory>,
}

#[derive(Debug, Deserialize)]
struct WireCategory {
    title: String,
}
