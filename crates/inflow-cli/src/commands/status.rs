//! Database/link/token status command

use std::path::Path;

use anyhow::Result;
use chrono::Utc;
use inflow_core::{db::DB_KEY_ENV, TokenStatus};

use super::{format_cents, open_db, truncate};

pub fn cmd_status(db_path: &Path, no_encrypt: bool, org: i64) -> Result<()> {
    use std::fs;

    println!();
    println!("📊 Inflow Status");
    println!("   ─────────────────────────────────────────────────");
    println!("   Database: {}", db_path.display());

    if db_path.exists() {
        if let Ok(metadata) = fs::metadata(db_path) {
            let size_kb = metadata.len() as f64 / 1024.0;
            if size_kb < 1024.0 {
                println!("   Size: {:.1} KB", size_kb);
            } else {
                println!("   Size: {:.1} MB", size_kb / 1024.0);
            }
        }
    } else {
        println!("   Size: (database not initialized)");
    }

    let has_key = std::env::var(DB_KEY_ENV).is_ok();
    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else if has_key {
        println!("   🔒 Encryption: ENABLED ({}=***)", DB_KEY_ENV);
    } else {
        println!("   ❌ Encryption: REQUIRED but {} not set", DB_KEY_ENV);
    }

    if !db_path.exists() {
        println!();
        println!("   Run `inflow init` to create the database");
        return Ok(());
    }

    let db = match open_db(db_path, no_encrypt) {
        Ok(db) => db,
        Err(e) => {
            println!();
            println!("   ❌ Error opening database: {}", e);
            if !no_encrypt && !has_key {
                println!("      Set {} or use --no-encrypt", DB_KEY_ENV);
            }
            return Ok(());
        }
    };

    println!();
    println!("   Organization: {}", org);

    let linked = db.provider_links(org)?;
    if linked.is_empty() {
        println!("   No providers linked");
    } else {
        for provider in linked {
            match db.get_tokens(org, provider)? {
                Some((tokens, TokenStatus::Active)) => {
                    let expiry = match tokens.expires_at {
                        Some(at) if at <= Utc::now() => "access token expired".to_string(),
                        Some(at) => format!("access token expires {}", at.format("%Y-%m-%d %H:%M")),
                        None => "no recorded expiry".to_string(),
                    };
                    println!("   🔗 {:<12} linked, {}", provider, expiry);
                }
                Some((_, TokenStatus::Invalid)) => {
                    println!("   🔑 {:<12} needs re-authorization", provider);
                }
                None => {
                    println!("   ⚠️  {:<12} linked but no tokens stored", provider);
                }
            }
        }
    }

    let accounts = db.list_accounts(org)?;
    if !accounts.is_empty() {
        println!();
        println!("   Accounts:");
        for account in &accounts {
            println!(
                "   {:<28} {:<9} {:>12}  ({}, synced {})",
                truncate(&account.name, 28),
                account.account_type,
                format_cents(account.balance_cents),
                account.provider,
                account
                    .last_synced_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "never".to_string())
            );
        }
    }

    Ok(())
}
