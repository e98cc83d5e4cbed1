//! Provider sync command

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use inflow_core::{
    EnvSecrets, Provider, ProviderClient, SyncConfig, SyncOrchestrator, SyncOutcome, SyncWindow,
    TokenVault,
};

use super::open_db;

pub async fn cmd_sync(db_path: &Path, no_encrypt: bool, org: i64, days: i64) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;

    let linked = db
        .provider_links(org)
        .context("Failed to read provider links")?;
    if linked.is_empty() {
        println!("⚠️  No providers linked for organization {}", org);
        println!("   Link one first: inflow link --org {} --provider plaid ...", org);
        return Ok(());
    }

    let config = SyncConfig::from_secrets(&EnvSecrets);
    let mut clients: HashMap<Provider, ProviderClient> = HashMap::new();
    for provider in &linked {
        match config.settings(*provider) {
            Some(settings) => {
                clients.insert(*provider, ProviderClient::for_provider(*provider, settings));
            }
            None => {
                println!(
                    "⚠️  {} is linked but INFLOW_{}_API_BASE is not set; it will be skipped",
                    provider,
                    provider.as_str().to_uppercase()
                );
            }
        }
    }

    let window = SyncWindow {
        start: (Utc::now() - Duration::days(days)).date_naive(),
        end: None,
    };

    println!(
        "🔄 Syncing {} provider(s) for organization {} ({} days)...",
        linked.len(),
        org,
        days
    );

    let vault = Arc::new(TokenVault::new(db.clone(), config));
    let orchestrator = SyncOrchestrator::new(db, vault, clients);
    let report = orchestrator
        .run(org, window)
        .await
        .context("Sync run failed")?;

    println!();
    println!("📊 Sync Results");
    println!("   ─────────────────────────────────────────────────");
    for status in &report.provider_statuses {
        let icon = match status.status {
            SyncOutcome::Ok => "✅",
            SyncOutcome::NeedsReauth => "🔑",
            SyncOutcome::Degraded => "⚠️ ",
        };
        print!(
            "   {} {:<12} {:>3} accounts, {:>4} new transactions",
            icon, status.provider, status.accounts_updated, status.transactions_added
        );
        if let Some(detail) = &status.detail {
            print!("  ({})", detail);
        }
        println!();
        if status.status == SyncOutcome::NeedsReauth {
            println!(
                "      Re-link to fix: inflow link --org {} --provider {} --access-token ...",
                report.organization_id, status.provider
            );
        }
    }
    println!("   ─────────────────────────────────────────────────");
    println!(
        "   Total: {} accounts updated, {} transactions added",
        report.accounts_updated, report.transactions_added
    );

    Ok(())
}
