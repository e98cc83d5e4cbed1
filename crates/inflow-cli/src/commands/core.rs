//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `cmd_init` - Initialize the database
//! - `cmd_link` - Link a provider and store its OAuth tokens

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use inflow_core::{Database, IntegrationTokens, Provider};

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path.to_str().context("Database path is not valid UTF-8")?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let _db = open_db(db_path, no_encrypt)?;

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Link a provider: inflow link --provider plaid --access-token ...");
    println!("  2. Pull your data:  inflow sync");

    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_link(
    db_path: &Path,
    no_encrypt: bool,
    org: i64,
    provider: &str,
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
) -> Result<()> {
    let provider: Provider = provider
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))
        .context("Unknown provider; expected plaid, teller or pocketsmith")?;

    let db = open_db(db_path, no_encrypt)?;
    db.link_provider(org, provider)
        .context("Failed to link provider")?;

    let tokens = IntegrationTokens {
        access_token,
        refresh_token,
        expires_at: expires_in.map(|secs| Utc::now() + Duration::seconds(secs)),
    };
    db.replace_tokens(org, provider, &tokens)
        .context("Failed to store tokens")?;

    println!("🔗 Linked {} for organization {}", provider, org);
    if tokens.refresh_token.is_none() {
        println!("   ⚠️  No refresh token: you will need to re-link when the access token expires");
    }
    println!("   Next: inflow sync --org {}", org);

    Ok(())
}
