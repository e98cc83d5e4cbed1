//! Plaid-style bank-linking backend
//!
//! POST-based JSON API with client credentials in the request body.
//! Location-capable: transactions may carry merchant geo data, which is
//! normalized into [`TransactionLocation`].
//!
//! Wire convention: amounts are decimal dollars with positive = money
//! leaving the account, so signs are flipped during normalization.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::config::ProviderSettings;
use crate::error::Result;
use crate::models::{
    fingerprint, normalize_merchant, CategorySplit, FinancialAccount, IntegrationStatus,
    NewTransaction, Provider, TransactionLocation,
};

use super::{check_response, dollars_to_cents, status_from_probe, ProviderBackend};

#[derive(Clone)]
pub struct PlaidBackend {
    http: reqwest::Client,
    api_base: String,
    client_id: String,
    client_secret: String,
}

impl PlaidBackend {
    pub fn new(settings: &ProviderSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
        }
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<reqwest::Response> {
        let mut body = body;
        body["client_id"] = json!(self.client_id);
        body["secret"] = json!(self.client_secret);
        let response = self
            .http
            .post(format!("{}{}", self.api_base, path))
            .json(&body)
            .send()
            .await?;
        check_response(Provider::Plaid, response)
    }

    async fn fetch_accounts(&self, access_token: &str) -> Result<Vec<FinancialAccount>> {
        let response = self
            .post("/accounts/get", json!({ "access_token": access_token }))
            .await?;
        let wire: WireAccountsResponse = response.json().await?;

        let now = Utc::now();
        Ok(wire
            .accounts
            .into_iter()
            .map(|a| FinancialAccount {
                id: 0,
                organization_id: 0,
                provider: Provider::Plaid,
                provider_account_id: a.account_id,
                name: a.name,
                account_type: a
                    .account_type
                    .parse()
                    .unwrap_or(crate::models::AccountType::Checking),
                balance_cents: dollars_to_cents(a.balances.current.unwrap_or(0.0)),
                currency: a
                    .balances
                    .iso_currency_code
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
        let end = end.unwrap_or_else(|| Utc::now().date_naive());
        let mut body = json!({
            "access_token": access_token,
            "start_date": start.to_string(),
            "end_date": end.to_string(),
        });
        if let Some(account_id) = account_filter {
            body["options"] = json!({ "account_ids": [account_id] });
        }

        let response = self.post("/transactions/get", body).await?;
        let wire: WireTransactionsResponse = response.json().await?;

        let mut transactions = Vec::with_capacity(wire.transactions.len());
        for t in wire.transactions {
            match normalize_transaction(t) {
                Ok(tx) => transactions.push(tx),
                Err(e) => {
                    // Malformed provider record: skip and log, never fatal
                    warn!(provider = "plaid", error = %e, "Skipping malformed transaction");
                }
            }
        }
        Ok(transactions)
    }
}

#[async_trait]
impl ProviderBackend for PlaidBackend {
    fn provider(&self) -> Provider {
        Provider::Plaid
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
        let probe = self
            .post("/accounts/get", json!({ "access_token": access_token }))
            .await
            .map(|_| ());
        status_from_probe(probe)
    }
}

fn normalize_transaction(t: WireTransaction) -> Result<NewTransaction> {
    let posted_date: NaiveDate = t.date.parse().map_err(|_| {
        crate::error::Error::Validation(format!("unparseable date '{}' on {}", t.date, t.transaction_id))
    })?;

    // Positive wire amounts are outflows; the shared model uses negative
    let amount_cents = -dollars_to_cents(t.amount);

    let merchant_raw = t.merchant_name.clone().unwrap_or_else(|| t.name.clone());
    let location = t.location.map(|l| TransactionLocation {
        address: l.address,
        city: l.city,
        region: l.region,
        postal_code: l.postal_code,
        country: l.country,
        latitude: l.lat,
        longitude: l.lon,
    });

    let splits = match t.personal_finance_category {
        Some(c) => vec![CategorySplit::full(presentable_category(&c.primary), 50.0)],
        None => vec![CategorySplit::full("Uncategorized", 0.0)],
    };

    Ok(NewTransaction {
        fingerprint: fingerprint(
            Provider::Plaid,
            &t.transaction_id,
            &t.account_id,
            amount_cents,
            posted_date,
        ),
        organization_id: 0,
        provider: Provider::Plaid,
        provider_transaction_id: t.transaction_id,
        provider_account_id: t.account_id,
        amount_cents,
        posted_date,
        merchant_normalized: normalize_merchant(&merchant_raw),
        merchant_raw,
        location: location.filter(|l| !l.is_empty()),
        splits,
    })
}

/// "FOOD_AND_DRINK" -> "Food And Drink"
fn presentable_category(wire: &str) -> String {
    wire.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Deserialize)]
struct WireAccountsResponse {
    accounts: Vec<WireAccount>,
}

#[derive(Debug, Deserialize)]
struct WireAccount {
    account_id: String,
    name: String,
    #[serde(rename = "type")]
    account_type: String,
    balances: WireBalances,
}

#[derive(Debug, Deserialize)]
struct WireBalances {
    current: Option<f64>,
    iso_currency_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireTransactionsResponse {
    transactions: Vec<WireTransaction>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireTransaction {
    transaction_id: String,
    account_id: String,
    amount: f64,
    date: String,
    name: String,
    merchant_name: Option<String>,
    location: Option<WireLocation>,
    personal_finance_category: Option<WireCategory>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireLocation {
    address: Option<String>,
    city: Option<String>,
    region: Option<String>,
    postal_code: Option<String>,
    country: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireCategory {
    primary: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire_tx() -> WireTransaction {
        WireTransaction {
            transaction_id: "tx-abc".to_string(),
            account_id: "acct-1".to_string(),
            amount: 15.99,
            date: "2026-02-03".to_string(),
            name: "NETFLIX.COM 866-579-7172".to_string(),
            merchant_name: None,
            location: Some(WireLocation {
                address: None,
                city: Some("Los Gatos".to_string()),
                region: Some("CA".to_string()),
                postal_code: None,
                country: Some("US".to_string()),
                lat: None,
                lon: None,
            }),
            personal_finance_category: Some(WireCategory {
                primary: "ENTERTAINMENT".to_string(),
            }),
        }
    }

    #[test]
    fn test_normalize_flips_outflow_sign() {
        let tx = normalize_transaction(wire_tx()).unwrap();
        assert_eq!(tx.amount_cents, -1599);
        assert_eq!(tx.merchant_normalized, "NETFLIX.COM");
        assert_eq!(tx.splits[0].category, "Entertainment");
        assert_eq!(tx.location.as_ref().unwrap().city.as_deref(), Some("Los Gatos"));
    }

    #[test]
    fn test_normalize_rejects_bad_date() {
        let mut wire = wire_tx();
        wire.date = "03/02/2026".to_string();
        assert!(normalize_transaction(wire).is_err());
    }

    #[test]
    fn test_normalization_is_idempotent_for_fingerprint() {
        let a = normalize_transaction(wire_tx()).unwrap();
        let b = normalize_transaction(wire_tx()).unwrap();
        assert_eq!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn test_presentable_category() {
        assert_eq!(presentable_category("FOOD_AND_DRINK"), "Food And Drink");
        assert_eq!(presentable_category("ENTERTAINMENT"), "Entertainment");
    }
}
