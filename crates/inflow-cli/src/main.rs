//! Inflow CLI - Account aggregation and spending analysis
//!
//! Usage:
//!   inflow init                      Initialize database
//!   inflow link --provider plaid --access-token ...   Link a provider
//!   inflow sync --days 30            Pull accounts and transactions
//!   inflow analyze --days 90         Spending insights for a window
//!   inflow recurring                 Detected recurring charges

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Link {
            org,
            provider,
            access_token,
            refresh_token,
            expires_in,
        } => commands::cmd_link(
            &cli.db,
            cli.no_encrypt,
            org,
            &provider,
            access_token,
            refresh_token,
            expires_in,
        ),
        Commands::Sync { org, days } => {
            commands::cmd_sync(&cli.db, cli.no_encrypt, org, days).await
        }
        Commands::Analyze { org, days, json } => {
            commands::cmd_analyze(&cli.db, cli.no_encrypt, org, days, json)
        }
        Commands::Recurring { org, days } => {
            commands::cmd_recurring(&cli.db, cli.no_encrypt, org, days)
        }
        Commands::Feedback {
            fingerprint,
            splits,
            kind,
        } => commands::cmd_feedback(&cli.db, cli.no_encrypt, &fingerprint, &splits, &kind),
        Commands::Status { org } => commands::cmd_status(&cli.db, cli.no_encrypt, org),
    }
}
