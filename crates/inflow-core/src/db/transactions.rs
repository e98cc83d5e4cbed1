//! Transaction merge and window queries

use chrono::{NaiveDate, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tracing::warn;

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{NewTransaction, Provider, Transaction};

/// Result of merging a fetched transaction into the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeResult {
    /// New fingerprint; row inserted
    Inserted(i64),
    /// Fingerprint already present with identical immutable fields
    Unchanged(i64),
    /// Existing row, splits refreshed from the provider (not yet user-corrected)
    SplitsRefreshed(i64),
    /// Immutable fields disagree with the stored row; stored row kept
    Conflict(i64),
}

impl MergeResult {
    pub fn is_insert(&self) -> bool {
        matches!(self, MergeResult::Inserted(_))
    }
}

/// Immutable fields of a stored row, for conflict checks on re-merge
struct StoredIdentity {
    id: i64,
    amount_cents: i64,
    posted_date: NaiveDate,
    provider_transaction_id: String,
    splits_json: String,
    splits_user_corrected: bool,
}

impl Database {
    /// Merge a fetched transaction by fingerprint (idempotent upsert).
    ///
    /// Re-merging an identical transaction is a no-op. An existing row's
    /// splits are refreshed only while no user correction has been applied.
    /// A fingerprint collision with different immutable fields keeps the
    /// stored row and reports [`MergeResult::Conflict`].
    ///
    /// Safe under concurrent merges: the insert is `OR IGNORE` against the
    /// (organization, fingerprint) unique key, and a lost race falls back to
    /// the existing-row path.
    pub fn merge_transaction(&self, tx: &NewTransaction) -> Result<MergeResult> {
        let conn = self.conn()?;

        if let Some(existing) = self.stored_identity(&conn, tx)? {
            return self.merge_existing(&conn, tx, existing);
        }

        let account_id = self.account_id(tx.organization_id, tx.provider, &tx.provider_account_id)?;
        if account_id.is_none() {
            warn!(
                provider = tx.provider.as_str(),
                provider_account_id = %tx.provider_account_id,
                "Merging transaction for unknown account"
            );
        }

        let splits_json = serde_json::to_string(&tx.splits)?;
        let location_json = tx
            .location
            .as_ref()
            .filter(|l| !l.is_empty())
            .map(serde_json::to_string)
            .transpose()?;

        let changed = conn.execute(
            r#"
            INSERT OR IGNORE INTO transactions (
                fingerprint, organization_id, account_id, provider,
                provider_transaction_id, amount_cents, posted_date,
                merchant_raw, merchant_normalized, location, splits
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                tx.fingerprint,
                tx.organization_id,
                account_id,
                tx.provider.as_str(),
                tx.provider_transaction_id,
                tx.amount_cents,
                tx.posted_date.to_string(),
                tx.merchant_raw,
                tx.merchant_normalized,
                location_json,
                splits_json,
            ],
        )?;

        if changed == 0 {
            // Concurrent merge won the insert race; treat ours as a re-merge
            let existing = self
                .stored_identity(&conn, tx)?
                .ok_or_else(|| crate::error::Error::NotFound("merged row vanished".to_string()))?;
            return self.merge_existing(&conn, tx, existing);
        }

        Ok(MergeResult::Inserted(conn.last_insert_rowid()))
    }

    fn stored_identity(
        &self,
        conn: &rusqlite::Connection,
        tx: &NewTransaction,
    ) -> Result<Option<StoredIdentity>> {
        let existing = conn
            .query_row(
                r#"
                SELECT id, amount_cents, posted_date, provider_transaction_id,
                       splits, splits_user_corrected
                FROM transactions
                WHERE organization_id = ? AND fingerprint = ?
                "#,
                params![tx.organization_id, tx.fingerprint],
                |row| {
                    let date_str: String = row.get(2)?;
                    Ok(StoredIdentity {
                        id: row.get(0)?,
                        amount_cents: row.get(1)?,
                        posted_date: date_str.parse().unwrap_or_default(),
                        provider_transaction_id: row.get(3)?,
                        splits_json: row.get(4)?,
                        splits_user_corrected: row.get::<_, i64>(5)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(existing)
    }

    fn merge_existing(
        &self,
        conn: &rusqlite::Connection,
        tx: &NewTransaction,
        existing: StoredIdentity,
    ) -> Result<MergeResult> {
        if existing.amount_cents != tx.amount_cents
            || existing.posted_date != tx.posted_date
            || existing.provider_transaction_id != tx.provider_transaction_id
        {
            // Provider data anomaly: same fingerprint, different identity.
            // The stored record wins.
            warn!(
                fingerprint = %tx.fingerprint,
                provider = tx.provider.as_str(),
                stored_amount = existing.amount_cents,
                incoming_amount = tx.amount_cents,
                "Fingerprint collision with incompatible fields, keeping stored record"
            );
            return Ok(MergeResult::Conflict(existing.id));
        }

        let incoming_json = serde_json::to_string(&tx.splits)?;
        if !existing.splits_user_corrected
            && !tx.splits.is_empty()
            && incoming_json != existing.splits_json
        {
            // Guarded update: user corrections committed between the read
            // and this write must not be overwritten
            let changed = conn.execute(
                "UPDATE transactions SET splits = ? WHERE id = ? AND splits_user_corrected = 0",
                params![incoming_json, existing.id],
            )?;
            if changed > 0 {
                return Ok(MergeResult::SplitsRefreshed(existing.id));
            }
        }

        Ok(MergeResult::Unchanged(existing.id))
    }

    /// Transactions for an organization within a posted-date window.
    ///
    /// `start` is inclusive; `end = None` means "up to now".
    pub fn transactions_in_window(
        &self,
        organization_id: i64,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let end = end.unwrap_or_else(|| Utc::now().date_naive());

        let mut stmt = conn.prepare(
            r#"
            SELECT id, fingerprint, organization_id, account_id, provider,
                   provider_transaction_id, amount_cents, posted_date,
                   merchant_raw, merchant_normalized, location, splits,
                   splits_user_corrected, created_at
            FROM transactions
            WHERE organization_id = ? AND posted_date >= ? AND posted_date <= ?
            ORDER BY posted_date, id
            "#,
        )?;

        let txns = stmt
            .query_map(
                params![organization_id, start.to_string(), end.to_string()],
                row_to_transaction,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(txns)
    }

    /// Look up a committed transaction by its fingerprint
    pub fn transaction_by_fingerprint(&self, fingerprint: &str) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        let tx = conn
            .query_row(
                r#"
                SELECT id, fingerprint, organization_id, account_id, provider,
                       provider_transaction_id, amount_cents, posted_date,
                       merchant_raw, merchant_normalized, location, splits,
                       splits_user_corrected, created_at
                FROM transactions
                WHERE fingerprint = ?
                "#,
                params![fingerprint],
                row_to_transaction,
            )
            .optional()?;
        Ok(tx)
    }
}

fn row_to_transaction(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    let provider_str: String = row.get(4)?;
    let date_str: String = row.get(7)?;
    let location_json: Option<String> = row.get(10)?;
    let splits_json: String = row.get(11)?;
    let created_at_str: String = row.get(13)?;

    Ok(Transaction {
        id: row.get(0)?,
        fingerprint: row.get(1)?,
        organization_id: row.get(2)?,
        account_id: row.get(3)?,
        provider: provider_str.parse().unwrap_or(Provider::Plaid),
        provider_transaction_id: row.get(5)?,
        amount_cents: row.get(6)?,
        posted_date: date_str.parse().unwrap_or_default(),
        merchant_raw: row.get(8)?,
        merchant_normalized: row.get(9)?,
        location: location_json.and_then(|j| serde_json::from_str(&j).ok()),
        splits: serde_json::from_str(&splits_json).unwrap_or_default(),
        splits_user_corrected: row.get::<_, i64>(12)? != 0,
        created_at: parse_datetime(&created_at_str),
    })
}
