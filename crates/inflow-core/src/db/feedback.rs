//! Categorization feedback recorder
//!
//! Records user corrections to proposed category splits. Records are
//! append-only and never mutated; the live transaction's split list always
//! reflects the most recent correction. This is the only post-commit
//! mutation path for a transaction's categorization.

use rusqlite::params;

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{validate_splits, CategorizationFeedback, CategorySplit, FeedbackType};

impl Database {
    /// Record a user categorization correction.
    ///
    /// Validates that `corrected_splits` sum to 100, appends an immutable
    /// feedback record, and updates the live transaction's splits in the
    /// same SQL transaction.
    pub fn record_feedback(
        &self,
        fingerprint: &str,
        original_splits: &[CategorySplit],
        corrected_splits: &[CategorySplit],
        feedback_type: FeedbackType,
    ) -> Result<CategorizationFeedback> {
        validate_splits(corrected_splits)?;

        let mut conn = self.conn()?;
        let sql_tx = conn.transaction()?;

        let tx_id: i64 = sql_tx
            .query_row(
                "SELECT id FROM transactions WHERE fingerprint = ?",
                params![fingerprint],
                |row| row.get(0),
            )
            .map_err(|_| {
                Error::NotFound(format!("no transaction with fingerprint {}", fingerprint))
            })?;

        let original_json = serde_json::to_string(original_splits)?;
        let corrected_json = serde_json::to_string(corrected_splits)?;

        sql_tx.execute(
            r#"
            INSERT INTO categorization_feedback (
                fingerprint, original_splits, corrected_splits, feedback_type
            ) VALUES (?, ?, ?, ?)
            "#,
            params![
                fingerprint,
                original_json,
                corrected_json,
                feedback_type.as_str()
            ],
        )?;
        let feedback_id = sql_tx.last_insert_rowid();

        sql_tx.execute(
            "UPDATE transactions SET splits = ?, splits_user_corrected = 1 WHERE id = ?",
            params![corrected_json, tx_id],
        )?;

        sql_tx.commit()?;

        self.get_feedback(feedback_id)
    }

    /// Get a feedback record by ID
    pub fn get_feedback(&self, id: i64) -> Result<CategorizationFeedback> {
        let conn = self.conn()?;
        conn.query_row(
            r#"
            SELECT id, fingerprint, original_splits, corrected_splits,
                   feedback_type, created_at
            FROM categorization_feedback
            WHERE id = ?
            "#,
            params![id],
            row_to_feedback,
        )
        .map_err(|e| e.into())
    }

    /// All feedback records for a transaction, oldest first
    ///
    /// Superseded corrections remain retrievable; the newest record matches
    /// the transaction's live splits.
    pub fn feedback_for_transaction(
        &self,
        fingerprint: &str,
    ) -> Result<Vec<CategorizationFeedback>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, fingerprint, original_splits, corrected_splits,
                   feedback_type, created_at
            FROM categorization_feedback
            WHERE fingerprint = ?
            ORDER BY id
            "#,
        )?;
        let records = stmt
            .query_map(params![fingerprint], row_to_feedback)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

fn row_to_feedback(row: &rusqlite::Row<'_>) -> rusqlite::Result<CategorizationFeedback> {
    let original_json: String = row.get(2)?;
    let corrected_json: String = row.get(3)?;
    let type_str: String = row.get(4)?;
    let created_at_str: String = row.get(5)?;

    Ok(CategorizationFeedback {
        id: row.get(0)?,
        fingerprint: row.get(1)?,
        original_splits: serde_json::from_str(&original_json).unwrap_or_default(),
        corrected_splits: serde_json::from_str(&corrected_json).unwrap_or_default(),
        feedback_type: type_str.parse().unwrap_or(FeedbackType::ManualEdit),
        created_at: parse_datetime(&created_at_str),
    })
}
