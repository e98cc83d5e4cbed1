//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI
//! arguments. The actual command implementations are in the `commands`
//! module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Inflow - Aggregate financial accounts and analyze spending patterns
#[derive(Parser)]
#[command(name = "inflow")]
#[command(about = "Self-hosted account aggregation and spending analysis", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "inflow.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set INFLOW_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Link a provider to an organization and store its OAuth tokens
    Link {
        /// Organization id
        #[arg(short, long, default_value = "1")]
        org: i64,

        /// Provider: plaid, teller, pocketsmith
        #[arg(short, long)]
        provider: String,

        /// OAuth access token from the provider's link flow
        #[arg(long)]
        access_token: String,

        /// OAuth refresh token, when the provider issues one
        #[arg(long)]
        refresh_token: Option<String>,

        /// Access token lifetime in seconds, when the provider reports one
        #[arg(long)]
        expires_in: Option<i64>,
    },

    /// Sync accounts and transactions from all linked providers
    Sync {
        /// Organization id
        #[arg(short, long, default_value = "1")]
        org: i64,

        /// How many days of transactions to fetch
        #[arg(short, long, default_value = "30")]
        days: i64,
    },

    /// Analyze spending patterns over a window
    Analyze {
        /// Organization id
        #[arg(short, long, default_value = "1")]
        org: i64,

        /// Analysis window in days
        #[arg(short, long, default_value = "90")]
        days: i64,

        /// Emit the full analysis as JSON
        #[arg(long)]
        json: bool,
    },

    /// List detected recurring charges
    Recurring {
        /// Organization id
        #[arg(short, long, default_value = "1")]
        org: i64,

        /// Detection window in days
        #[arg(short, long, default_value = "365")]
        days: i64,
    },

    /// Correct a transaction's category splits
    Feedback {
        /// Transaction fingerprint (shown by `inflow analyze`)
        #[arg(short, long)]
        fingerprint: String,

        /// Corrected splits as "Category:percent" pairs,
        /// e.g. "Groceries:60,Household:40" (must sum to 100)
        #[arg(short, long)]
        splits: String,

        /// Feedback kind: manual_edit, quick_accept, quick_reject
        #[arg(short, long, default_value = "manual_edit")]
        kind: String,
    },

    /// Show database, link and token status
    Status {
        /// Organization id
        #[arg(short, long, default_value = "1")]
        org: i64,
    },
}
