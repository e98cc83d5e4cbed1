//! Sync orchestrator: drives one sync run for an organization
//!
//! Providers are fetched concurrently under a bounded worker pool (bounded
//! by provider count, not organization count, to stay inside upstream rate
//! limits); within a provider the fetch is sequential, accounts before
//! transactions, so balances reflect the same or later state than the
//! transaction window.
//!
//! No single provider's failure aborts another's processing: auth expiry
//! reports the provider as needing re-auth, transient failures are retried
//! with bounded exponential backoff and then degrade the provider for this
//! run. Only a failure in the control path itself (resolving configured
//! providers) fails the whole run. Merges already applied stay applied;
//! partial sync is a valid terminal state.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::db::{Database, MergeResult};
use crate::error::{Error, Result};
use crate::models::{Provider, ProviderSyncStatus, SyncOutcome, SyncReport};
use crate::providers::{ProviderBackend, ProviderClient};
use crate::vault::TokenVault;

/// Posted-date window for a sync run; `start` inclusive, `end = None`
/// means "up to now"
#[derive(Debug, Clone, Copy)]
pub struct SyncWindow {
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
}

/// Tunables for one orchestrator instance
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Upper bound on concurrently fetching providers
    pub parallelism: usize,
    /// Retry ceiling per network call (including the first attempt)
    pub max_attempts: u32,
    /// Base delay for exponential backoff
    pub base_backoff: Duration,
    /// Timeout applied to every provider network call
    pub call_timeout: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            parallelism: 4,
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
            call_timeout: Duration::from_secs(30),
        }
    }
}

pub struct SyncOrchestrator {
    db: Database,
    vault: Arc<TokenVault>,
    clients: HashMap<Provider, ProviderClient>,
    options: SyncOptions,
    events: Option<mpsc::Sender<SyncReport>>,
}

impl SyncOrchestrator {
    pub fn new(
        db: Database,
        vault: Arc<TokenVault>,
        clients: HashMap<Provider, ProviderClient>,
    ) -> Self {
        Self {
            db,
            vault,
            clients,
            options: SyncOptions::default(),
            events: None,
        }
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    /// Publish one sync-completed event per run on this channel. The
    /// orchestrator makes no assumptions about subscribers.
    pub fn with_events(mut self, events: mpsc::Sender<SyncReport>) -> Self {
        self.events = Some(events);
        self
    }

    /// Run one sync for an organization
    pub async fn run(&self, organization_id: i64, window: SyncWindow) -> Result<SyncReport> {
        self.run_with_cancel(organization_id, window, None).await
    }

    /// Run one sync, aborting remaining work when `cancel` flips to true.
    /// Merges already committed are never rolled back.
    pub async fn run_with_cancel(
        &self,
        organization_id: i64,
        window: SyncWindow,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<SyncReport> {
        // The one fatal path: not knowing which providers to sync
        let providers = self.db.provider_links(organization_id)?;
        info!(
            organization_id,
            providers = providers.len(),
            start = %window.start,
            "Starting sync run"
        );

        let bound = self.options.parallelism.min(providers.len()).max(1);
        let semaphore = Arc::new(Semaphore::new(bound));
        let mut set: JoinSet<ProviderSyncStatus> = JoinSet::new();

        for provider in providers {
            let Some(client) = self.clients.get(&provider).cloned() else {
                warn!(provider = provider.as_str(), "Provider linked but no adapter configured");
                set.spawn(async move {
                    degraded(provider, "no adapter configured for provider")
                });
                continue;
            };

            let db = self.db.clone();
            let vault = self.vault.clone();
            let options = self.options.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();

            set.spawn(async move {
                let provider = client.provider();
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return degraded(provider, "sync worker pool closed");
                };
                sync_provider(db, vault, client, organization_id, window, options, cancel).await
            });
        }

        let mut statuses = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(status) => statuses.push(status),
                Err(e) => warn!(error = %e, "Provider sync task panicked"),
            }
        }
        statuses.sort_by_key(|s| s.provider.as_str());

        let report = SyncReport {
            organization_id,
            accounts_updated: statuses.iter().map(|s| s.accounts_updated).sum(),
            transactions_added: statuses.iter().map(|s| s.transactions_added).sum(),
            provider_statuses: statuses,
        };

        if let Some(events) = &self.events {
            if events.send(report.clone()).await.is_err() {
                warn!("Sync event channel closed, dropping sync-completed event");
            }
        }

        info!(
            organization_id,
            accounts = report.accounts_updated,
            transactions = report.transactions_added,
            fully_ok = report.is_fully_ok(),
            "Sync run complete"
        );
        Ok(report)
    }
}

/// Outcome of one authenticated fetch step
enum StepResult<T> {
    Done(T),
    NeedsReauth,
    Degraded(String),
}

async fn sync_provider(
    db: Database,
    vault: Arc<TokenVault>,
    client: ProviderClient,
    organization_id: i64,
    window: SyncWindow,
    options: SyncOptions,
    cancel: Option<watch::Receiver<bool>>,
) -> ProviderSyncStatus {
    let provider = client.provider();

    if is_cancelled(&cancel) {
        return degraded(provider, "cancelled");
    }

    // Accounts first: balances must reflect the same or later state than
    // the transaction window
    let accounts = {
        let client = &client;
        fetch_with_auth(&vault, organization_id, provider, &options, &cancel, |token| {
            let client = client.clone();
            async move { client.get_accounts(&token).await }
        })
        .await
    };
    let accounts = match accounts {
        StepResult::Done(accounts) => accounts,
        StepResult::NeedsReauth => return needs_reauth(provider),
        StepResult::Degraded(detail) => return degraded(provider, &detail),
    };

    let mut accounts_updated = 0;
    for mut account in accounts {
        account.organization_id = organization_id;
        match db.upsert_account(&account) {
            Ok(_) => accounts_updated += 1,
            Err(e) => warn!(
                provider = provider.as_str(),
                error = %e,
                "Failed to upsert account"
            ),
        }
    }

    if is_cancelled(&cancel) {
        return ProviderSyncStatus {
            provider,
            status: SyncOutcome::Degraded,
            detail: Some("cancelled".to_string()),
            accounts_updated,
            transactions_added: 0,
        };
    }

    let transactions = {
        let client = &client;
        fetch_with_auth(&vault, organization_id, provider, &options, &cancel, |token| {
            let client = client.clone();
            async move {
                client
                    .get_transactions(&token, window.start, window.end)
                    .await
            }
        })
        .await
    };
    let transactions = match transactions {
        StepResult::Done(transactions) => transactions,
        StepResult::NeedsReauth => return needs_reauth(provider),
        StepResult::Degraded(detail) => return degraded(provider, &detail),
    };

    let mut transactions_added = 0;
    let mut conflicts = 0;
    for mut tx in transactions {
        tx.organization_id = organization_id;
        match db.merge_transaction(&tx) {
            Ok(MergeResult::Inserted(_)) => transactions_added += 1,
            Ok(MergeResult::Conflict(_)) => conflicts += 1,
            Ok(_) => {}
            Err(e) => {
                // One bad record never fails the provider, let alone the run
                warn!(
                    provider = provider.as_str(),
                    fingerprint = %tx.fingerprint,
                    error = %e,
                    "Failed to merge transaction"
                );
            }
        }
    }

    debug!(
        provider = provider.as_str(),
        accounts_updated, transactions_added, conflicts, "Provider sync finished"
    );

    ProviderSyncStatus {
        provider,
        status: SyncOutcome::Ok,
        detail: (conflicts > 0).then(|| format!("{} fingerprint conflicts", conflicts)),
        accounts_updated,
        transactions_added,
    }
}

/// One authenticated fetch: obtain a token from the vault, call with
/// retries, and on an upstream credential rejection take the reactive
/// refresh path (force one refresh, retry once) before reporting re-auth.
async fn fetch_with_auth<T, F, Fut>(
    vault: &TokenVault,
    organization_id: i64,
    provider: Provider,
    options: &SyncOptions,
    cancel: &Option<watch::Receiver<bool>>,
    mut call: F,
) -> StepResult<T>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let tokens = match vault.get(organization_id, provider).await {
        Ok(tokens) => tokens,
        Err(Error::AuthExpired(_)) => return StepResult::NeedsReauth,
        Err(e) => return StepResult::Degraded(e.to_string()),
    };

    match with_retries(provider, options, cancel, || {
        call(tokens.access_token.clone())
    })
    .await
    {
        Ok(value) => StepResult::Done(value),
        Err(Error::AuthExpired(_)) => {
            // The provider rejected a token the vault considered live:
            // reactive refresh, then one more round of attempts
            debug!(
                provider = provider.as_str(),
                organization_id, "Upstream rejected token, attempting reactive refresh"
            );
            let fresh = match vault
                .refresh(organization_id, provider, &tokens.access_token)
                .await
            {
                Ok(fresh) => fresh,
                Err(_) => return StepResult::NeedsReauth,
            };
            match with_retries(provider, options, cancel, || {
                call(fresh.access_token.clone())
            })
            .await
            {
                Ok(value) => StepResult::Done(value),
                Err(Error::AuthExpired(_)) => StepResult::NeedsReauth,
                Err(e) => StepResult::Degraded(e.to_string()),
            }
        }
        Err(e) => StepResult::Degraded(e.to_string()),
    }
}

/// Bounded exponential backoff around one provider call. Every attempt is
/// capped by the call timeout; rate-limit responses honor the
/// provider-supplied delay when present.
async fn with_retries<T, F, Fut>(
    provider: Provider,
    options: &SyncOptions,
    cancel: &Option<watch::Receiver<bool>>,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let outcome = tokio::time::timeout(options.call_timeout, call()).await;
        let err = match outcome {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => e,
            Err(_) => Error::ProviderUnavailable(format!("{} call timed out", provider)),
        };

        if !err.is_transient() || attempt >= options.max_attempts || is_cancelled(cancel) {
            return Err(err);
        }

        let delay = match &err {
            Error::RateLimited {
                retry_after: Some(secs),
            } => Duration::from_secs(*secs),
            _ => options.base_backoff * 2u32.saturating_pow(attempt - 1),
        };
        warn!(
            provider = provider.as_str(),
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Transient provider failure, backing off"
        );
        tokio::time::sleep(delay).await;
    }
}

fn is_cancelled(cancel: &Option<watch::Receiver<bool>>) -> bool {
    cancel.as_ref().map(|c| *c.borrow()).unwrap_or(false)
}

fn needs_reauth(provider: Provider) -> ProviderSyncStatus {
    ProviderSyncStatus {
        provider,
        status: SyncOutcome::NeedsReauth,
        detail: Some("user re-authorization required".to_string()),
        accounts_updated: 0,
        transactions_added: 0,
    }
}

fn degraded(provider: Provider, detail: &str) -> ProviderSyncStatus {
    ProviderSyncStatus {
        provider,
        status: SyncOutcome::Degraded,
        detail: Some(detail.to_string()),
        accounts_updated: 0,
        transactions_added: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProviderSettings, SyncConfig};
    use crate::models::*;
    use crate::providers::{MockFailure, MockProvider};
    use crate::test_utils::MockProviderServer;
    use chrono::{Duration as ChronoDuration, Utc};

    fn mock_account(provider: Provider, pid: &str) -> FinancialAccount {
        FinancialAccount {
            id: 0,
            organization_id: 0,
            provider,
            provider_account_id: pid.to_string(),
            name: format!("{} account", provider),
            account_type: AccountType::Checking,
            balance_cents: 100_000,
            currency: "USD".to_string(),
            last_synced_at: Some(Utc::now()),
        }
    }

    fn mock_transaction(provider: Provider, tx_id: &str, date: &str) -> NewTransaction {
        let posted_date: NaiveDate = date.parse().unwrap();
        NewTransaction {
            fingerprint: fingerprint(provider, tx_id, "acct-1", -1250, posted_date),
            organization_id: 0,
            provider,
            provider_transaction_id: tx_id.to_string(),
            provider_account_id: "acct-1".to_string(),
            amount_cents: -1250,
            posted_date,
            merchant_raw: "COFFEE #12".to_string(),
            merchant_normalized: "COFFEE".to_string(),
            location: None,
            splits: vec![CategorySplit::full("Dining", 50.0)],
        }
    }

    fn live_tokens() -> IntegrationTokens {
        IntegrationTokens {
            access_token: "live".to_string(),
            refresh_token: Some("rt".to_string()),
            expires_at: Some(Utc::now() + ChronoDuration::hours(4)),
        }
    }

    fn fast_options() -> SyncOptions {
        SyncOptions {
            base_backoff: Duration::from_millis(1),
            ..SyncOptions::default()
        }
    }

    fn orchestrator(db: &Database, clients: HashMap<Provider, ProviderClient>) -> SyncOrchestrator {
        let vault = Arc::new(TokenVault::new(db.clone(), SyncConfig::default()));
        SyncOrchestrator::new(db.clone(), vault, clients).with_options(fast_options())
    }

    fn window() -> SyncWindow {
        SyncWindow {
            start: "2026-01-01".parse().unwrap(),
            end: None,
        }
    }

    #[tokio::test]
    async fn test_degraded_provider_never_blocks_others() {
        let db = Database::in_memory().unwrap();
        db.link_provider(1, Provider::Plaid).unwrap();
        db.link_provider(1, Provider::Teller).unwrap();
        // Teller has a live credential; Plaid has none, so the vault
        // reports auth expiry for it
        db.replace_tokens(1, Provider::Teller, &live_tokens()).unwrap();

        let mut clients = HashMap::new();
        clients.insert(
            Provider::Plaid,
            ProviderClient::mock(MockProvider::new(Provider::Plaid)),
        );
        clients.insert(
            Provider::Teller,
            ProviderClient::mock(
                MockProvider::new(Provider::Teller)
                    .with_accounts(vec![mock_account(Provider::Teller, "acct-1")])
                    .with_transactions(vec![
                        mock_transaction(Provider::Teller, "t-1", "2026-01-10"),
                        mock_transaction(Provider::Teller, "t-2", "2026-01-20"),
                    ]),
            ),
        );

        let report = orchestrator(&db, clients).run(1, window()).await.unwrap();

        assert_eq!(report.provider_statuses.len(), 2);
        let plaid = report
            .provider_statuses
            .iter()
            .find(|s| s.provider == Provider::Plaid)
            .unwrap();
        let teller = report
            .provider_statuses
            .iter()
            .find(|s| s.provider == Provider::Teller)
            .unwrap();
        assert_eq!(plaid.status, SyncOutcome::NeedsReauth);
        assert_eq!(teller.status, SyncOutcome::Ok);
        assert_eq!(report.transactions_added, 2);

        // The succeeding provider's data is committed
        let txns = db
            .transactions_in_window(1, "2026-01-01".parse().unwrap(), None)
            .unwrap();
        assert_eq!(txns.len(), 2);
        assert!(txns.iter().all(|t| t.provider == Provider::Teller));
    }

    fn config_with_server(server: &MockProviderServer) -> SyncConfig {
        SyncConfig::default().with_provider(
            Provider::Plaid,
            ProviderSettings {
                api_base: server.url(),
                token_url: format!("{}/oauth/token", server.url()),
                client_id: "client-1".to_string(),
                client_secret: "secret-1".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_upstream_rejection_triggers_reactive_refresh() {
        let db = Database::in_memory().unwrap();
        let server = MockProviderServer::start().await;
        db.link_provider(1, Provider::Plaid).unwrap();
        // The vault believes this token is live for hours; the provider
        // has revoked it upstream
        db.replace_tokens(1, Provider::Plaid, &live_tokens()).unwrap();

        let mock = MockProvider::new(Provider::Plaid)
            .with_accounts(vec![mock_account(Provider::Plaid, "acct-1")])
            .with_transactions(vec![mock_transaction(Provider::Plaid, "t-1", "2026-01-10")])
            .rejecting_token("live");
        let mut clients = HashMap::new();
        clients.insert(Provider::Plaid, ProviderClient::mock(mock));

        let vault = Arc::new(TokenVault::new(db.clone(), config_with_server(&server)));
        let orchestrator = SyncOrchestrator::new(db.clone(), vault, clients)
            .with_options(fast_options());

        let report = orchestrator.run(1, window()).await.unwrap();

        // The rejection forced one real token exchange, after which the
        // fetch succeeded with the replacement token
        assert_eq!(server.refresh_calls(), 1);
        assert_eq!(report.provider_statuses[0].status, SyncOutcome::Ok);
        assert_eq!(report.accounts_updated, 1);
        assert_eq!(report.transactions_added, 1);

        let (stored, status) = db.get_tokens(1, Provider::Plaid).unwrap().unwrap();
        assert_ne!(stored.access_token, "live");
        assert_eq!(status, TokenStatus::Active);
    }

    #[tokio::test]
    async fn test_reactive_refresh_failure_reports_reauth() {
        let db = Database::in_memory().unwrap();
        let server = MockProviderServer::start().await;
        server.set_reject_refresh(true);
        db.link_provider(1, Provider::Plaid).unwrap();
        db.replace_tokens(1, Provider::Plaid, &live_tokens()).unwrap();

        let mock = MockProvider::new(Provider::Plaid)
            .with_accounts(vec![mock_account(Provider::Plaid, "acct-1")])
            .rejecting_token("live");
        let mut clients = HashMap::new();
        clients.insert(Provider::Plaid, ProviderClient::mock(mock));

        let vault = Arc::new(TokenVault::new(db.clone(), config_with_server(&server)));
        let orchestrator = SyncOrchestrator::new(db.clone(), vault, clients)
            .with_options(fast_options());

        let report = orchestrator.run(1, window()).await.unwrap();

        // The refresh token was exchanged once, rejected, and the provider
        // reported as needing re-authorization without failing the run
        assert_eq!(server.refresh_calls(), 1);
        assert_eq!(report.provider_statuses[0].status, SyncOutcome::NeedsReauth);
        assert_eq!(report.accounts_updated, 0);

        let (_, status) = db.get_tokens(1, Provider::Plaid).unwrap().unwrap();
        assert_eq!(status, TokenStatus::Invalid);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let db = Database::in_memory().unwrap();
        db.link_provider(1, Provider::Plaid).unwrap();
        db.replace_tokens(1, Provider::Plaid, &live_tokens()).unwrap();

        let mock = MockProvider::new(Provider::Plaid)
            .with_accounts(vec![mock_account(Provider::Plaid, "acct-1")])
            .with_transactions(vec![mock_transaction(Provider::Plaid, "t-1", "2026-01-10")])
            .failing_n(MockFailure::Unavailable, 1);

        let mut clients = HashMap::new();
        clients.insert(Provider::Plaid, ProviderClient::mock(mock.clone()));

        let report = orchestrator(&db, clients).run(1, window()).await.unwrap();

        assert_eq!(report.provider_statuses[0].status, SyncOutcome::Ok);
        assert_eq!(report.transactions_added, 1);
        assert!(mock.call_count() >= 2, "first attempt must have been retried");
    }

    #[tokio::test]
    async fn test_retry_ceiling_degrades_provider_only() {
        let db = Database::in_memory().unwrap();
        db.link_provider(1, Provider::Plaid).unwrap();
        db.link_provider(1, Provider::Teller).unwrap();
        db.replace_tokens(1, Provider::Plaid, &live_tokens()).unwrap();
        db.replace_tokens(1, Provider::Teller, &live_tokens()).unwrap();

        let mut clients = HashMap::new();
        clients.insert(
            Provider::Plaid,
            ProviderClient::mock(
                MockProvider::new(Provider::Plaid).failing_forever(MockFailure::Unavailable),
            ),
        );
        clients.insert(
            Provider::Teller,
            ProviderClient::mock(
                MockProvider::new(Provider::Teller)
                    .with_accounts(vec![mock_account(Provider::Teller, "acct-1")]),
            ),
        );

        let report = orchestrator(&db, clients).run(1, window()).await.unwrap();

        let plaid = report
            .provider_statuses
            .iter()
            .find(|s| s.provider == Provider::Plaid)
            .unwrap();
        let teller = report
            .provider_statuses
            .iter()
            .find(|s| s.provider == Provider::Teller)
            .unwrap();
        assert_eq!(plaid.status, SyncOutcome::Degraded);
        assert_eq!(teller.status, SyncOutcome::Ok);
        assert_eq!(teller.accounts_updated, 1);
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let db = Database::in_memory().unwrap();
        db.link_provider(1, Provider::Plaid).unwrap();
        db.replace_tokens(1, Provider::Plaid, &live_tokens()).unwrap();

        let mut clients = HashMap::new();
        clients.insert(
            Provider::Plaid,
            ProviderClient::mock(
                MockProvider::new(Provider::Plaid)
                    .with_accounts(vec![mock_account(Provider::Plaid, "acct-1")])
                    .with_transactions(vec![mock_transaction(Provider::Plaid, "t-1", "2026-01-10")]),
            ),
        );

        let orchestrator = orchestrator(&db, clients);
        let first = orchestrator.run(1, window()).await.unwrap();
        let second = orchestrator.run(1, window()).await.unwrap();

        assert_eq!(first.transactions_added, 1);
        assert_eq!(second.transactions_added, 0);
        let txns = db
            .transactions_in_window(1, "2026-01-01".parse().unwrap(), None)
            .unwrap();
        assert_eq!(txns.len(), 1);
    }

    #[tokio::test]
    async fn test_sync_completed_event_published() {
        let db = Database::in_memory().unwrap();
        db.link_provider(1, Provider::Teller).unwrap();
        db.replace_tokens(1, Provider::Teller, &live_tokens()).unwrap();

        let mut clients = HashMap::new();
        clients.insert(
            Provider::Teller,
            ProviderClient::mock(
                MockProvider::new(Provider::Teller)
                    .with_accounts(vec![mock_account(Provider::Teller, "acct-1")])
                    .with_transactions(vec![mock_transaction(Provider::Teller, "t-1", "2026-01-10")]),
            ),
        );

        let (tx, mut rx) = mpsc::channel(4);
        let vault = Arc::new(TokenVault::new(db.clone(), SyncConfig::default()));
        let orchestrator = SyncOrchestrator::new(db.clone(), vault, clients)
            .with_options(fast_options())
            .with_events(tx);

        orchestrator.run(1, window()).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.organization_id, 1);
        assert_eq!(event.transactions_added, 1);
        assert_eq!(event.provider_statuses.len(), 1);
        assert_eq!(event.provider_statuses[0].status, SyncOutcome::Ok);
    }

    #[tokio::test]
    async fn test_cancel_aborts_remaining_work() {
        let db = Database::in_memory().unwrap();
        db.link_provider(1, Provider::Plaid).unwrap();
        db.replace_tokens(1, Provider::Plaid, &live_tokens()).unwrap();

        let mut clients = HashMap::new();
        clients.insert(
            Provider::Plaid,
            ProviderClient::mock(
                MockProvider::new(Provider::Plaid)
                    .with_transactions(vec![mock_transaction(Provider::Plaid, "t-1", "2026-01-10")]),
            ),
        );

        let (cancel_tx, cancel_rx) = watch::channel(true);
        let report = orchestrator(&db, clients)
            .run_with_cancel(1, window(), Some(cancel_rx))
            .await
            .unwrap();
        drop(cancel_tx);

        assert_eq!(report.provider_statuses[0].status, SyncOutcome::Degraded);
        assert_eq!(report.transactions_added, 0);
        let txns = db
            .transactions_in_window(1, "2026-01-01".parse().unwrap(), None)
            .unwrap();
        assert!(txns.is_empty());
    }
}
