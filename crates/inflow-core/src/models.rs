//! Domain models for inflow

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Tolerance for the split-percentage sum check (percentage points)
pub const SPLIT_SUM_TOLERANCE: f64 = 0.01;

/// Supported account-aggregation providers
///
/// A small closed set by design: adding a provider means adding a backend
/// variant, not a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Plaid-style bank linking (location-capable)
    Plaid,
    /// Teller-style bank linking
    Teller,
    /// Pocketsmith-style budgeting platform (pre-categorized transactions)
    Pocketsmith,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Plaid, Provider::Teller, Provider::Pocketsmith];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plaid => "plaid",
            Self::Teller => "teller",
            Self::Pocketsmith => "pocketsmith",
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plaid" => Ok(Self::Plaid),
            "teller" => Ok(Self::Teller),
            "pocketsmith" => Ok(Self::Pocketsmith),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Account types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Checking,
    Savings,
    Credit,
    Loan,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Checking => "checking",
            Self::Savings => "savings",
            Self::Credit => "credit",
            Self::Loan => "loan",
        }
    }
}

impl std::str::FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "checking" | "depository" => Ok(Self::Checking),
            "savings" => Ok(Self::Savings),
            "credit" | "credit_card" => Ok(Self::Credit),
            "loan" => Ok(Self::Loan),
            _ => Err(format!("Unknown account type: {}", s)),
        }
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A financial account owned by an organization
///
/// One row per (organization, provider, provider-native account id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialAccount {
    pub id: i64,
    pub organization_id: i64,
    pub provider: Provider,
    /// The provider's own identifier for the account
    pub provider_account_id: String,
    pub name: String,
    pub account_type: AccountType,
    /// Current balance in integer cents
    pub balance_cents: i64,
    /// ISO 4217 currency code
    pub currency: String,
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Geographic data for a transaction
///
/// Only populated by location-capable providers; absent fields stay None.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionLocation {
    pub address: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl TransactionLocation {
    pub fn is_empty(&self) -> bool {
        self.address.is_none()
            && self.city.is_none()
            && self.region.is_none()
            && self.postal_code.is_none()
            && self.country.is_none()
            && self.latitude.is_none()
            && self.longitude.is_none()
    }
}

/// One entry of a transaction's category split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySplit {
    pub category: String,
    /// Share of the transaction amount, in [0, 100]
    pub percentage: f64,
    /// Categorizer confidence, in [0, 100]
    pub confidence: f64,
}

impl CategorySplit {
    pub fn full(category: impl Into<String>, confidence: f64) -> Self {
        Self {
            category: category.into(),
            percentage: 100.0,
            confidence,
        }
    }
}

/// Validate a category split list: every percentage in [0, 100] and the
/// total equal to 100 within [`SPLIT_SUM_TOLERANCE`].
pub fn validate_splits(splits: &[CategorySplit]) -> Result<()> {
    if splits.is_empty() {
        return Err(Error::Validation("split list is empty".to_string()));
    }
    let mut sum = 0.0;
    for split in splits {
        if !(0.0..=100.0).contains(&split.percentage) {
            return Err(Error::Validation(format!(
                "split percentage {} for '{}' outside [0, 100]",
                split.percentage, split.category
            )));
        }
        sum += split.percentage;
    }
    if (sum - 100.0).abs() > SPLIT_SUM_TOLERANCE {
        return Err(Error::Validation(format!(
            "split percentages sum to {}, expected 100",
            sum
        )));
    }
    Ok(())
}

/// A transaction as fetched from a provider, before it has a store row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    /// Dedup key, see [`fingerprint`]
    pub fingerprint: String,
    pub organization_id: i64,
    pub provider: Provider,
    pub provider_transaction_id: String,
    pub provider_account_id: String,
    /// Signed integer cents; negative = outflow
    pub amount_cents: i64,
    pub posted_date: NaiveDate,
    pub merchant_raw: String,
    pub merchant_normalized: String,
    pub location: Option<TransactionLocation>,
    pub splits: Vec<CategorySplit>,
}

/// A committed transaction
///
/// Immutable once stored except for the split list and the corrected flag,
/// which change only through the feedback recorder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub fingerprint: String,
    pub organization_id: i64,
    pub account_id: Option<i64>,
    pub provider: Provider,
    pub provider_transaction_id: String,
    pub amount_cents: i64,
    pub posted_date: NaiveDate,
    pub merchant_raw: String,
    pub merchant_normalized: String,
    pub location: Option<TransactionLocation>,
    pub splits: Vec<CategorySplit>,
    /// Set once a user correction has been applied; provider merges never
    /// overwrite the splits afterwards.
    pub splits_user_corrected: bool,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// The highest-share split category, or "Uncategorized"
    pub fn primary_category(&self) -> &str {
        self.splits
            .iter()
            .max_by(|a, b| a.percentage.total_cmp(&b.percentage))
            .map(|s| s.category.as_str())
            .unwrap_or("Uncategorized")
    }
}

/// Compute the deterministic dedup fingerprint for a transaction.
///
/// Derived from the provider-stable identifying fields only, so re-fetching
/// the same window always produces the same key.
pub fn fingerprint(
    provider: Provider,
    provider_transaction_id: &str,
    provider_account_id: &str,
    amount_cents: i64,
    posted_date: NaiveDate,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(provider.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(provider_transaction_id.as_bytes());
    hasher.update(b"|");
    hasher.update(provider_account_id.as_bytes());
    hasher.update(b"|");
    hasher.update(amount_cents.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(posted_date.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Normalize a raw merchant descriptor for grouping.
///
/// Strips reference numbers, card suffixes and store numbers that make the
/// same merchant look different across charges
/// ("NETFLIX.COM 866-579-7172 #8231" -> "NETFLIX.COM").
pub fn normalize_merchant(raw: &str) -> String {
    use std::sync::OnceLock;
    static NOISE: OnceLock<regex::Regex> = OnceLock::new();

    let noise = NOISE.get_or_init(|| {
        // trailing digit runs, #1234 store markers, phone-like fragments
        regex::Regex::new(r"(#\d+|\d{3}[-.]\d{3}[-.]\d{4}|\*+\d+|\b\d{4,}\b)").unwrap()
    });

    let stripped = noise.replace_all(raw, " ");
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_matches(|c: char| !c.is_alphanumeric());
    if trimmed.is_empty() {
        raw.trim().to_uppercase()
    } else {
        trimmed.to_uppercase()
    }
}

/// OAuth credentials for one (organization, provider) pair
///
/// One live record per pair; superseded (not appended) on refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Persisted token state
///
/// `Expiring` and `Refreshing` are transient vault states, not rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    Active,
    /// Refresh token rejected; user re-authorization required
    Invalid,
}

impl TokenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Invalid => "invalid",
        }
    }
}

impl std::str::FromStr for TokenStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "invalid" => Ok(Self::Invalid),
            _ => Err(format!("Unknown token status: {}", s)),
        }
    }
}

/// Connection health of a provider integration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum IntegrationStatus {
    Connected,
    /// Credential rejected upstream; triggers the vault's reactive refresh
    NeedsReauth,
    Error(String),
}

/// How a categorization correction was made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    ManualEdit,
    QuickAccept,
    QuickReject,
}

impl FeedbackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ManualEdit => "manual_edit",
            Self::QuickAccept => "quick_accept",
            Self::QuickReject => "quick_reject",
        }
    }
}

impl std::str::FromStr for FeedbackType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "manual_edit" => Ok(Self::ManualEdit),
            "quick_accept" => Ok(Self::QuickAccept),
            "quick_reject" => Ok(Self::QuickReject),
            _ => Err(format!("Unknown feedback type: {}", s)),
        }
    }
}

/// An immutable record of a user categorization correction
///
/// Append-only: a correction superseding an earlier one is a new record
/// referencing the same fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorizationFeedback {
    pub id: i64,
    pub fingerprint: String,
    pub original_splits: Vec<CategorySplit>,
    pub corrected_splits: Vec<CategorySplit>,
    pub feedback_type: FeedbackType,
    pub created_at: DateTime<Utc>,
}

/// Recurring cadence bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Weekly,
    Biweekly,
    Monthly,
    Quarterly,
}

impl Frequency {
    /// (expected interval, tolerance) in days
    pub fn band(&self) -> (i64, i64) {
        match self {
            Self::Weekly => (7, 2),
            Self::Biweekly => (14, 3),
            Self::Monthly => (30, 5),
            Self::Quarterly => (90, 10),
        }
    }

    /// Classify a mean inter-arrival interval into a cadence band
    pub fn classify(mean_interval_days: f64) -> Option<Frequency> {
        for freq in [
            Self::Weekly,
            Self::Biweekly,
            Self::Monthly,
            Self::Quarterly,
        ] {
            let (expected, tolerance) = freq.band();
            if (mean_interval_days - expected as f64).abs() <= tolerance as f64 {
                return Some(freq);
            }
        }
        None
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Biweekly => "biweekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
        }
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A detected recurring charge (derived, recomputed per analysis run)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringPattern {
    pub merchant: String,
    pub category: String,
    pub frequency: Frequency,
    pub occurrences: usize,
    pub average_amount_cents: i64,
    /// In [0, 100]; tighter intervals and more occurrences score higher
    pub confidence: f64,
    pub last_date: NaiveDate,
    pub next_expected_date: NaiveDate,
}

/// Per-category spend aggregate over the analysis window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryInsight {
    pub category: String,
    pub total_cents: i64,
    pub transaction_count: usize,
    pub average_cents: i64,
    /// total / distinct months in the window
    pub monthly_average_cents: i64,
    pub percent_of_total: f64,
}

/// Per-merchant aggregate over the analysis window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantInsight {
    pub merchant: String,
    pub total_cents: i64,
    pub transaction_count: usize,
    pub distinct_categories: usize,
    pub first_seen: NaiveDate,
    pub last_seen: NaiveDate,
}

/// Per-calendar-month spend trend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendInsight {
    /// "YYYY-MM"
    pub month: String,
    pub total_cents: i64,
    pub transaction_count: usize,
    pub dominant_category: Option<String>,
    /// Percent change vs the preceding month; None for the first month
    pub change_percent: Option<f64>,
}

/// The single largest expense in the window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LargestExpense {
    pub merchant: String,
    pub amount_cents: i64,
    pub date: NaiveDate,
}

/// Top-level summary over the analysis window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub unique_merchants: usize,
    pub distinct_categories: usize,
    pub largest_expense: Option<LargestExpense>,
    pub average_transaction_cents: i64,
}

/// Full result of one pattern analysis run
///
/// Ephemeral: a function of the store's current state, safely recomputable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternAnalysis {
    pub organization_id: i64,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub recurring: Vec<RecurringPattern>,
    pub categories: Vec<CategoryInsight>,
    pub merchants: Vec<MerchantInsight>,
    pub trends: Vec<TrendInsight>,
    pub summary: AnalysisSummary,
}

/// Per-provider outcome of a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Ok,
    NeedsReauth,
    /// Transient failures exhausted the retry budget this run
    Degraded,
}

impl SyncOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::NeedsReauth => "needs_reauth",
            Self::Degraded => "degraded",
        }
    }
}

/// Status report for one provider within a sync run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSyncStatus {
    pub provider: Provider,
    pub status: SyncOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub accounts_updated: usize,
    pub transactions_added: usize,
}

/// Result of one sync run; also the sync-completed event payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub organization_id: i64,
    pub accounts_updated: usize,
    pub transactions_added: usize,
    pub provider_statuses: Vec<ProviderSyncStatus>,
}

impl SyncReport {
    pub fn is_fully_ok(&self) -> bool {
        self.provider_statuses
            .iter()
            .all(|s| s.status == SyncOutcome::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_round_trip() {
        for provider in Provider::ALL {
            let parsed: Provider = provider.as_str().parse().unwrap();
            assert_eq!(provider, parsed);
        }
        assert!("venmo".parse::<Provider>().is_err());
    }

    #[test]
    fn test_validate_splits_accepts_sum_100() {
        let splits = vec![
            CategorySplit {
                category: "Groceries".into(),
                percentage: 60.0,
                confidence: 90.0,
            },
            CategorySplit {
                category: "Household".into(),
                percentage: 40.0,
                confidence: 80.0,
            },
        ];
        assert!(validate_splits(&splits).is_ok());
    }

    #[test]
    fn test_validate_splits_tolerates_rounding() {
        let splits = vec![
            CategorySplit {
                category: "A".into(),
                percentage: 33.33,
                confidence: 50.0,
            },
            CategorySplit {
                category: "B".into(),
                percentage: 33.33,
                confidence: 50.0,
            },
            CategorySplit {
                category: "C".into(),
                percentage: 33.335,
                confidence: 50.0,
            },
        ];
        assert!(validate_splits(&splits).is_ok());
    }

    #[test]
    fn test_validate_splits_rejects_bad_sum() {
        let splits = vec![CategorySplit {
            category: "Groceries".into(),
            percentage: 90.0,
            confidence: 90.0,
        }];
        assert!(matches!(
            validate_splits(&splits),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_validate_splits_rejects_out_of_range() {
        let splits = vec![
            CategorySplit {
                category: "A".into(),
                percentage: 150.0,
                confidence: 50.0,
            },
            CategorySplit {
                category: "B".into(),
                percentage: -50.0,
                confidence: 50.0,
            },
        ];
        assert!(validate_splits(&splits).is_err());
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let a = fingerprint(Provider::Plaid, "tx-1", "acct-1", -1599, date);
        let b = fingerprint(Provider::Plaid, "tx-1", "acct-1", -1599, date);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_fingerprint_distinguishes_fields() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let base = fingerprint(Provider::Plaid, "tx-1", "acct-1", -1599, date);
        assert_ne!(
            base,
            fingerprint(Provider::Teller, "tx-1", "acct-1", -1599, date)
        );
        assert_ne!(
            base,
            fingerprint(Provider::Plaid, "tx-2", "acct-1", -1599, date)
        );
        assert_ne!(
            base,
            fingerprint(Provider::Plaid, "tx-1", "acct-1", -1600, date)
        );
    }

    #[test]
    fn test_normalize_merchant() {
        assert_eq!(
            normalize_merchant("NETFLIX.COM 866-579-7172 #8231"),
            "NETFLIX.COM"
        );
        assert_eq!(normalize_merchant("TRADER JOE'S #552"), "TRADER JOE'S");
        assert_eq!(normalize_merchant("  spotify  "), "SPOTIFY");
    }

    #[test]
    fn test_frequency_classification() {
        assert_eq!(Frequency::classify(7.3), Some(Frequency::Weekly));
        assert_eq!(Frequency::classify(14.0), Some(Frequency::Biweekly));
        assert_eq!(Frequency::classify(30.5), Some(Frequency::Monthly));
        assert_eq!(Frequency::classify(92.0), Some(Frequency::Quarterly));
        assert_eq!(Frequency::classify(50.0), None);
        assert_eq!(Frequency::classify(200.0), None);
    }

    #[test]
    fn test_primary_category() {
        let tx = Transaction {
            id: 1,
            fingerprint: "f".into(),
            organization_id: 1,
            account_id: None,
            provider: Provider::Plaid,
            provider_transaction_id: "tx-1".into(),
            amount_cents: -1000,
            posted_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            merchant_raw: "m".into(),
            merchant_normalized: "M".into(),
            location: None,
            splits: vec![
                CategorySplit {
                    category: "Minor".into(),
                    percentage: 30.0,
                    confidence: 50.0,
                },
                CategorySplit {
                    category: "Major".into(),
                    percentage: 70.0,
                    confidence: 50.0,
                },
            ],
            splits_user_corrected: false,
            created_at: Utc::now(),
        };
        assert_eq!(tx.primary_category(), "Major");
    }
}
