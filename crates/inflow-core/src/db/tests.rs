//! Database tests

use super::*;
use crate::models::*;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, Utc};

    fn account(org: i64, provider: Provider, pid: &str) -> FinancialAccount {
        FinancialAccount {
            id: 0,
            organization_id: org,
            provider,
            provider_account_id: pid.to_string(),
            name: format!("{} {}", provider, pid),
            account_type: AccountType::Checking,
            balance_cents: 125_000,
            currency: "USD".to_string(),
            last_synced_at: Some(Utc::now()),
        }
    }

    fn transaction(org: i64, tx_id: &str, amount_cents: i64, date: &str) -> NewTransaction {
        let posted_date: NaiveDate = date.parse().unwrap();
        NewTransaction {
            fingerprint: fingerprint(Provider::Plaid, tx_id, "acct-1", amount_cents, posted_date),
            organization_id: org,
            provider: Provider::Plaid,
            provider_transaction_id: tx_id.to_string(),
            provider_account_id: "acct-1".to_string(),
            amount_cents,
            posted_date,
            merchant_raw: "NETFLIX.COM 866-579-7172".to_string(),
            merchant_normalized: "NETFLIX.COM".to_string(),
            location: None,
            splits: vec![CategorySplit::full("Subscriptions", 75.0)],
        }
    }

    #[test]
    fn test_in_memory_db() {
        let db = Database::in_memory().unwrap();
        let accounts = db.list_accounts(1).unwrap();
        assert!(accounts.is_empty());
    }

    #[test]
    fn test_encrypted_db_persists_across_reopen() {
        use tempfile::tempdir;
        let dir = tempdir().unwrap();
        let path = dir.path().join("inflow.db");
        let path = path.to_str().unwrap();

        {
            let db = Database::new_with_key(path, Some("hunter2")).unwrap();
            db.upsert_account(&account(1, Provider::Plaid, "acct-1")).unwrap();
        }

        // Same passphrase reopens the store with its data intact
        let db = Database::new_with_key(path, Some("hunter2")).unwrap();
        assert_eq!(db.list_accounts(1).unwrap().len(), 1);
        drop(db);

        // A wrong passphrase cannot open it
        assert!(Database::new_with_key(path, Some("wrong")).is_err());
    }

    #[test]
    fn test_account_upsert_is_keyed_by_provider_account() {
        let db = Database::in_memory().unwrap();

        let id = db.upsert_account(&account(1, Provider::Plaid, "acct-1")).unwrap();
        assert!(id > 0);

        // Same provider-native account updates in place
        let mut updated = account(1, Provider::Plaid, "acct-1");
        updated.balance_cents = 99_000;
        let id2 = db.upsert_account(&updated).unwrap();
        assert_eq!(id, id2);

        let accounts = db.list_accounts(1).unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].balance_cents, 99_000);

        // Another org's view is separate
        assert!(db.list_accounts(2).unwrap().is_empty());
    }

    #[test]
    fn test_provider_links() {
        let db = Database::in_memory().unwrap();
        db.link_provider(1, Provider::Teller).unwrap();
        db.link_provider(1, Provider::Plaid).unwrap();
        db.link_provider(1, Provider::Plaid).unwrap(); // idempotent

        let links = db.provider_links(1).unwrap();
        assert_eq!(links, vec![Provider::Plaid, Provider::Teller]);
        assert!(db.provider_links(2).unwrap().is_empty());
    }

    #[test]
    fn test_merge_is_idempotent() {
        let db = Database::in_memory().unwrap();
        db.upsert_account(&account(1, Provider::Plaid, "acct-1")).unwrap();

        let tx = transaction(1, "tx-1", -1599, "2026-01-15");
        let first = db.merge_transaction(&tx).unwrap();
        assert!(first.is_insert());

        // Re-merging the identical transaction is a no-op
        let second = db.merge_transaction(&tx).unwrap();
        match second {
            MergeResult::Unchanged(_) => {}
            other => panic!("expected Unchanged, got {:?}", other),
        }

        let txns = db
            .transactions_in_window(1, "2026-01-01".parse().unwrap(), None)
            .unwrap();
        assert_eq!(txns.len(), 1);
    }

    #[test]
    fn test_merge_conflict_prefers_stored_record() {
        let db = Database::in_memory().unwrap();
        db.upsert_account(&account(1, Provider::Plaid, "acct-1")).unwrap();

        let tx = transaction(1, "tx-1", -1599, "2026-01-15");
        db.merge_transaction(&tx).unwrap();

        // Same fingerprint, different immutable field: a provider anomaly
        let mut anomaly = tx.clone();
        anomaly.amount_cents = -2599;
        let result = db.merge_transaction(&anomaly).unwrap();
        assert!(matches!(result, MergeResult::Conflict(_)));

        let stored = db.transaction_by_fingerprint(&tx.fingerprint).unwrap().unwrap();
        assert_eq!(stored.amount_cents, -1599);
    }

    #[test]
    fn test_merge_refreshes_splits_until_user_corrected() {
        let db = Database::in_memory().unwrap();
        db.upsert_account(&account(1, Provider::Plaid, "acct-1")).unwrap();

        let tx = transaction(1, "tx-1", -1599, "2026-01-15");
        db.merge_transaction(&tx).unwrap();

        // Provider re-categorizes: splits refresh
        let mut recategorized = tx.clone();
        recategorized.splits = vec![CategorySplit::full("Streaming", 88.0)];
        let result = db.merge_transaction(&recategorized).unwrap();
        assert!(matches!(result, MergeResult::SplitsRefreshed(_)));

        // User corrects; later provider merges no longer touch splits
        let corrected = vec![CategorySplit::full("Entertainment", 100.0)];
        db.record_feedback(
            &tx.fingerprint,
            &recategorized.splits,
            &corrected,
            FeedbackType::ManualEdit,
        )
        .unwrap();

        let mut again = tx.clone();
        again.splits = vec![CategorySplit::full("Streaming", 91.0)];
        let result = db.merge_transaction(&again).unwrap();
        assert!(matches!(result, MergeResult::Unchanged(_)));

        let stored = db.transaction_by_fingerprint(&tx.fingerprint).unwrap().unwrap();
        assert_eq!(stored.splits, corrected);
        assert!(stored.splits_user_corrected);
    }

    #[test]
    fn test_window_query_bounds() {
        let db = Database::in_memory().unwrap();
        db.upsert_account(&account(1, Provider::Plaid, "acct-1")).unwrap();

        for (tx_id, date) in [
            ("tx-1", "2026-01-31"),
            ("tx-2", "2026-02-01"),
            ("tx-3", "2026-02-28"),
            ("tx-4", "2026-03-01"),
        ] {
            db.merge_transaction(&transaction(1, tx_id, -1000, date)).unwrap();
        }

        // start inclusive, end inclusive
        let txns = db
            .transactions_in_window(
                1,
                "2026-02-01".parse().unwrap(),
                Some("2026-02-28".parse().unwrap()),
            )
            .unwrap();
        assert_eq!(txns.len(), 2);

        // end omitted means "up to now"
        let txns = db
            .transactions_in_window(1, "2026-02-01".parse().unwrap(), None)
            .unwrap();
        assert_eq!(txns.len(), 3);
    }

    #[test]
    fn test_feedback_requires_valid_splits() {
        let db = Database::in_memory().unwrap();
        db.upsert_account(&account(1, Provider::Plaid, "acct-1")).unwrap();
        let tx = transaction(1, "tx-1", -1599, "2026-01-15");
        db.merge_transaction(&tx).unwrap();

        let bad = vec![CategorySplit {
            category: "Partial".to_string(),
            percentage: 55.0,
            confidence: 80.0,
        }];
        let result = db.record_feedback(&tx.fingerprint, &tx.splits, &bad, FeedbackType::ManualEdit);
        assert!(matches!(result, Err(crate::error::Error::Validation(_))));

        // The live transaction is untouched
        let stored = db.transaction_by_fingerprint(&tx.fingerprint).unwrap().unwrap();
        assert!(!stored.splits_user_corrected);
    }

    #[test]
    fn test_feedback_supersession() {
        let db = Database::in_memory().unwrap();
        db.upsert_account(&account(1, Provider::Plaid, "acct-1")).unwrap();
        let tx = transaction(1, "tx-1", -1599, "2026-01-15");
        db.merge_transaction(&tx).unwrap();

        let first = vec![CategorySplit::full("Entertainment", 100.0)];
        let second = vec![
            CategorySplit {
                category: "Entertainment".to_string(),
                percentage: 50.0,
                confidence: 100.0,
            },
            CategorySplit {
                category: "Family".to_string(),
                percentage: 50.0,
                confidence: 100.0,
            },
        ];

        db.record_feedback(&tx.fingerprint, &tx.splits, &first, FeedbackType::QuickAccept)
            .unwrap();
        db.record_feedback(&tx.fingerprint, &first, &second, FeedbackType::ManualEdit)
            .unwrap();

        // Live split reflects the most recent correction
        let stored = db.transaction_by_fingerprint(&tx.fingerprint).unwrap().unwrap();
        assert_eq!(stored.splits, second);

        // Both records remain retrievable, oldest first
        let records = db.feedback_for_transaction(&tx.fingerprint).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].corrected_splits, first);
        assert_eq!(records[1].corrected_splits, second);
        assert_eq!(records[1].original_splits, first);
    }

    #[test]
    fn test_feedback_unknown_fingerprint() {
        let db = Database::in_memory().unwrap();
        let splits = vec![CategorySplit::full("Misc", 100.0)];
        let result = db.record_feedback("no-such", &splits, &splits, FeedbackType::QuickReject);
        assert!(matches!(result, Err(crate::error::Error::NotFound(_))));
    }

    #[test]
    fn test_token_replace_and_invalidate() {
        let db = Database::in_memory().unwrap();

        assert!(db.get_tokens(1, Provider::Plaid).unwrap().is_none());

        let tokens = IntegrationTokens {
            access_token: "at-1".to_string(),
            refresh_token: Some("rt-1".to_string()),
            expires_at: Some(Utc::now() + Duration::hours(1)),
        };
        db.replace_tokens(1, Provider::Plaid, &tokens).unwrap();

        let (stored, status) = db.get_tokens(1, Provider::Plaid).unwrap().unwrap();
        assert_eq!(stored.access_token, "at-1");
        assert_eq!(status, TokenStatus::Active);

        // Refresh supersedes in place, one live row per (org, provider)
        let refreshed = IntegrationTokens {
            access_token: "at-2".to_string(),
            refresh_token: Some("rt-2".to_string()),
            expires_at: Some(Utc::now() + Duration::hours(1)),
        };
        db.replace_tokens(1, Provider::Plaid, &refreshed).unwrap();
        let (stored, _) = db.get_tokens(1, Provider::Plaid).unwrap().unwrap();
        assert_eq!(stored.access_token, "at-2");

        db.mark_tokens_invalid(1, Provider::Plaid).unwrap();
        let (_, status) = db.get_tokens(1, Provider::Plaid).unwrap().unwrap();
        assert_eq!(status, TokenStatus::Invalid);

        // Re-linking resets the record to active
        db.replace_tokens(1, Provider::Plaid, &tokens).unwrap();
        let (_, status) = db.get_tokens(1, Provider::Plaid).unwrap().unwrap();
        assert_eq!(status, TokenStatus::Active);
    }
}
