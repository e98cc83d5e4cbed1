//! Financial account operations

use rusqlite::{params, OptionalExtension};

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{AccountType, FinancialAccount, Provider};

impl Database {
    /// Upsert an account keyed by (organization, provider, provider account id)
    ///
    /// Balance, name, type and last_synced_at reflect the latest fetch;
    /// identity fields never change. Returns the row id.
    pub fn upsert_account(&self, account: &FinancialAccount) -> Result<i64> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO accounts (
                organization_id, provider, provider_account_id, name,
                account_type, balance_cents, currency, last_synced_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(organization_id, provider, provider_account_id) DO UPDATE SET
                name = excluded.name,
                account_type = excluded.account_type,
                balance_cents = excluded.balance_cents,
                currency = excluded.currency,
                last_synced_at = excluded.last_synced_at
            "#,
            params![
                account.organization_id,
                account.provider.as_str(),
                account.provider_account_id,
                account.name,
                account.account_type.as_str(),
                account.balance_cents,
                account.currency,
                account.last_synced_at.map(|t| t.to_rfc3339()),
            ],
        )?;

        let id: i64 = conn.query_row(
            "SELECT id FROM accounts WHERE organization_id = ? AND provider = ? AND provider_account_id = ?",
            params![
                account.organization_id,
                account.provider.as_str(),
                account.provider_account_id
            ],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Row id for a provider-native account id, if the account is known
    pub fn account_id(
        &self,
        organization_id: i64,
        provider: Provider,
        provider_account_id: &str,
    ) -> Result<Option<i64>> {
        let conn = self.conn()?;
        let id = conn
            .query_row(
                "SELECT id FROM accounts WHERE organization_id = ? AND provider = ? AND provider_account_id = ?",
                params![organization_id, provider.as_str(), provider_account_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// List all accounts for an organization
    pub fn list_accounts(&self, organization_id: i64) -> Result<Vec<FinancialAccount>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, organization_id, provider, provider_account_id, name,
                   account_type, balance_cents, currency, last_synced_at
            FROM accounts
            WHERE organization_id = ?
            ORDER BY provider, name
            "#,
        )?;

        let accounts = stmt
            .query_map(params![organization_id], |row| {
                let provider_str: String = row.get(2)?;
                let type_str: String = row.get(5)?;
                let last_synced: Option<String> = row.get(8)?;
                Ok(FinancialAccount {
                    id: row.get(0)?,
                    organization_id: row.get(1)?,
                    provider: provider_str.parse().unwrap_or(Provider::Plaid),
                    provider_account_id: row.get(3)?,
                    name: row.get(4)?,
                    account_type: type_str.parse().unwrap_or(AccountType::Checking),
                    balance_cents: row.get(6)?,
                    currency: row.get(7)?,
                    last_synced_at: last_synced.map(|s| parse_datetime(&s)),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(accounts)
    }

    /// Record that an organization linked a provider
    pub fn link_provider(&self, organization_id: i64, provider: Provider) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO provider_links (organization_id, provider) VALUES (?, ?)",
            params![organization_id, provider.as_str()],
        )?;
        Ok(())
    }

    /// Providers configured for an organization
    pub fn provider_links(&self, organization_id: i64) -> Result<Vec<Provider>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT provider FROM provider_links WHERE organization_id = ? ORDER BY provider",
        )?;
        let providers = stmt
            .query_map(params![organization_id], |row| {
                let s: String = row.get(0)?;
                Ok(s)
            })?
            .filter_map(|r| r.ok())
            .filter_map(|s| s.parse().ok())
            .collect();
        Ok(providers)
    }
}
