//! Inflow Core Library
//!
//! Shared functionality for the Inflow account aggregation tool:
//! - Database access and migrations (encrypted SQLite)
//! - Provider adapters (Plaid, Teller, Pocketsmith) behind one capability set
//! - OAuth token vault with proactive single-flight refresh
//! - Sync orchestrator with per-provider isolation and retry/backoff
//! - Pattern analysis: recurring charges, category/merchant/trend insights
//! - Append-only categorization feedback recorder

pub mod analysis;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod providers;
pub mod sync;
pub mod vault;

/// Test utilities including the mock provider HTTP server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use analysis::PatternAnalyzer;
pub use config::{EnvSecrets, ProviderSettings, Secrets, StaticSecrets, SyncConfig};
pub use db::{Database, MergeResult};
pub use error::{Error, Result};
pub use models::{
    fingerprint, normalize_merchant, validate_splits, AccountType, AnalysisSummary,
    CategorizationFeedback, CategoryInsight, CategorySplit, FeedbackType, FinancialAccount,
    Frequency, IntegrationStatus, IntegrationTokens, MerchantInsight, NewTransaction,
    PatternAnalysis, Provider, ProviderSyncStatus, RecurringPattern, SyncOutcome, SyncReport,
    TokenStatus, Transaction, TransactionLocation, TrendInsight,
};
pub use providers::{
    MockFailure, MockProvider, PlaidBackend, PocketsmithBackend, ProviderBackend, ProviderClient,
    TellerBackend,
};
pub use sync::{SyncOptions, SyncOrchestrator, SyncWindow};
pub use vault::TokenVault;
