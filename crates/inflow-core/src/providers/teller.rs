//! Teller-style bank-linking backend
//!
//! GET-based API with Bearer authentication. Amounts arrive as signed
//! decimal strings with negative already meaning outflow. No location data.
//! Transactions are exposed per account, so the cross-account fetch walks
//! accounts first and filters the window client-side.

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

use super::{check_response, status_from_probe, ProviderBackend};

#[derive(Clone)]
pub struct TellerBackend {
    http: reqwest::Client,
    api_base: String,
}

impl TellerBackend {
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
        check_response(Provider::Teller, response)
    }

    async fn fetch_accounts(&self, access_token: &str) -> Result<Vec<FinancialAccount>> {
        let wire: Vec<WireAccount> = self.get(access_token, "/accounts").await?.json().await?;
        let now = Utc::now();

        let mut accounts = Vec::with_capacity(wire.len());
        for a in wire {
            // Balances live on a separate endpoint
            let balance: WireBalance = self
                .get(access_token, &format!("/accounts/{}/balances", a.id))
                .await?
                .json()
                .await?;
            let balance_cents = parse_cents(&balance.ledger).unwrap_or_else(|| {
                warn!(provider = "teller", account = %a.id, "Unparseable ledger balance");
                0
            });

            accounts.push(FinancialAccount {
                id: 0,
                organization_id: 0,
                provider: Provider::Teller,
                provider_account_id: a.id,
                name: a.name,
                account_type: a
                    .account_type
                    .parse()
                    .unwrap_or(crate::models::AccountType::Checking),
                balance_cents,
                currency: a.currency.unwrap_or_else(|| "USD".to_string()),
                last_synced_at: Some(now),
            });
        }
        Ok(accounts)
    }

    async fn fetch_account_transactions(
        &self,
        access_token: &str,
        provider_account_id: &str,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<Vec<NewTransaction>> {
        let end = end.unwrap_or_else(|| Utc::now().date_naive());
        let wire: Vec<WireTransaction> = self
            .get(
                access_token,
                &format!("/accounts/{}/transactions", provider_account_id),
            )
            .await?
            .json()
            .await?;

        let mut transactions = Vec::new();
        for t in wire {
            match normalize_transaction(t) {
                Ok(tx) if tx.posted_date >= start && tx.posted_date <= end => {
                    transactions.push(tx)
                }
                Ok(_) => {} // outside the requested window
                Err(e) => {
                    warn!(provider = "teller", error = %e, "Skipping malformed transaction");
                }
            }
        }
        Ok(transactions)
    }
}

#[async_trait]
impl ProviderBackend for TellerBackend {
    fn provider(&self) -> Provider {
        Provider::Teller
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
        let wire: Vec<WireAccount> = self.get(access_token, "/accounts").await?.json().await?;
        let mut all = Vec::new();
        for account in wire {
            let mut txns = self
                .fetch_account_transactions(access_token, &account.id, start, end)
                .await?;
            all.append(&mut txns);
        }
        Ok(all)
    }

    async fn get_account_transactions(
        &self,
        access_token: &str,
        provider_account_id: &str,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<Vec<NewTransaction>> {
        self.fetch_account_transactions(access_token, provider_account_id, start, end)
            .await
    }

    async fn refresh_balances(&self, access_token: &str) -> Result<Vec<FinancialAccount>> {
        self.fetch_accounts(access_token).await
    }

    async fn get_status(&self, access_token: &str) -> IntegrationStatus {
        let probe = self.get(access_token, "/accounts").await.map(|_| ());
        status_from_probe(probe)
    }
}

fn normalize_transaction(t: WireTransaction) -> Result<NewTransaction> {
    let posted_date: NaiveDate = t
        .date
        .parse()
        .map_err(|_| Error::Validation(format!("unparseable date '{}' on {}", t.date, t.id)))?;
    let amount_cents = parse_cents(&t.amount)
        .ok_or_else(|| Error::Validation(format!("unparseable amount '{}' on {}", t.amount, t.id)))?;

    let merchant_raw = t
        .details
        .as_ref()
        .and_then(|d| d.counterparty.as_ref())
        .and_then(|c| c.name.clone())
        .unwrap_or_else(|| t.description.clone());

    let splits = match t.details.and_then(|d| d.category) {
        Some(c) if !c.is_empty() => vec![CategorySplit::full(capitalize(&c), 50.0)],
        _ => vec![CategorySplit::full("Uncategorized", 0.0)],
    };

    Ok(NewTransaction {
        fingerprint: fingerprint(
            Provider::Teller,
            &t.id,
            &t.account_id,
            amount_cents,
            posted_date,
        ),
        organization_id: 0,
        provider: Provider::Teller,
        provider_transaction_id: t.id,
        provider_account_id: t.account_id,
        amount_cents,
        posted_date,
        merchant_normalized: normalize_merchant(&merchant_raw),
        merchant_raw,
        location: None,
        splits,
    })
}

/// Parse a signed decimal-dollars string ("-12.34") into integer cents
/// without going through floating point.
fn parse_cents(s: &str) -> Option<i64> {
    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let (whole, frac) = match digits.split_once('.') {
        Some((w, f)) => (w, f),
        None => (digits, ""),
    };
    if frac.len() > 2 {
        return None;
    }
    let whole: i64 = whole.parse().ok()?;
    let frac: i64 = if frac.is_empty() {
        0
    } else {
        // "5" means 50 cents
        format!("{:0<2}", frac).parse().ok()?
    };
    let cents = whole.checked_mul(100)?.checked_add(frac)?;
    Some(if negative { -cents } else { cents })
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[derive(Debug, Deserialize)]
struct WireAccount {
    id: String,
    name: String,
    #[serde(rename = "type")]
    account_type: String,
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireBalance {
    ledger: String,
}

#[derive(Debug, Deserialize)]
struct WireTransaction {
    id: String,
    account_id: String,
    amount: String,
    date: String,
    description: String,
    details: Option<WireDetails>,
}

#[derive(Debug, Deserialize)]
struct WireDetails {
    category: Option<String>,
    counterparty: Option<WireCounterparty>,
}

#[derive(Debug, Deserialize)]
struct WireCounterparty {
    name: Option<String>,
}
