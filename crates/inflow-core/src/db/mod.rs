//! Transaction store: SQLite with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `accounts` - Financial account upserts and lookups
//! - `transactions` - Merge-by-fingerprint and window queries
//! - `tokens` - Integration token rows for the vault
//! - `feedback` - Append-only categorization feedback records
//!
//! The store is the only shared mutable state between concurrent sync runs;
//! merge is an upsert keyed by (organization, fingerprint), never a lock
//! over the whole store.

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;

use crate::error::{Error, Result};

mod accounts;
mod feedback;
mod tokens;
mod transactions;

#[cfg(test)]
mod tests;

pub use transactions::MergeResult;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "INFLOW_DB_KEY";

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the
/// same key, regardless of database path. This allows moving/renaming/
/// restoring the database freely.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Fixed application salt - changing this would invalidate all existing
    // encrypted databases
    const APP_SALT: &[u8; 16] = b"inflow-salt-v1-0";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

/// Parse a SQLite datetime string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    // SQLite stores as "YYYY-MM-DD HH:MM:SS" format
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| {
            chrono::DateTime::parse_from_rfc3339(s).map(|dt| dt.naive_utc())
        })
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    db_path: String,
}

impl Database {
    /// Create a new database connection pool with encryption
    ///
    /// Requires `INFLOW_DB_KEY` environment variable to be set. The database
    /// is encrypted using SQLCipher with a key derived from the passphrase
    /// via Argon2 (the token vault persists OAuth credentials here).
    pub fn new(path: &str) -> Result<Self> {
        let encryption_key = std::env::var(DB_KEY_ENV).ok();
        match encryption_key {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for unencrypted databases (not recommended for production).",
                DB_KEY_ENV
            ))),
        }
    }

    /// Create a new unencrypted database connection pool
    ///
    /// WARNING: only use for development or testing; the store holds OAuth
    /// refresh tokens.
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Create a new database with an explicit encryption key
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);

        let pool = if let Some(pass) = passphrase {
            let key = derive_key(pass)?;
            let key_pragma = format!("PRAGMA key = 'x\"{}\"';", key);

            // Set the key on every new pooled connection
            let manager = manager.with_init(move |conn| {
                conn.execute_batch(&key_pragma)?;
                Ok(())
            });

            Pool::builder().max_size(10).build(manager)?
        } else {
            Pool::builder().max_size(10).build(manager)?
        };

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create a throwaway database for testing
    ///
    /// Note: Uses a temporary file rather than `:memory:` because SQLCipher
    /// has issues with in-memory databases in the connection pool.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = format!(
            "{}/inflow_test_{}_{}.db",
            std::env::temp_dir().display(),
            std::process::id(),
            id
        );

        let _ = std::fs::remove_file(&path);

        Self::new_unencrypted(&path)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Enable foreign keys
            PRAGMA foreign_keys = ON;

            -- WAL mode: readers don't block writers, needed for concurrent
            -- merges during a sync run alongside analysis reads
            PRAGMA journal_mode = WAL;

            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            -- Financial accounts, one row per provider-native account
            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY,
                organization_id INTEGER NOT NULL,
                provider TEXT NOT NULL,
                provider_account_id TEXT NOT NULL,
                name TEXT NOT NULL,
                account_type TEXT NOT NULL,
                balance_cents INTEGER NOT NULL DEFAULT 0,
                currency TEXT NOT NULL DEFAULT 'USD',
                last_synced_at DATETIME,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(organization_id, provider, provider_account_id)
            );

            CREATE INDEX IF NOT EXISTS idx_accounts_org ON accounts(organization_id);

            -- Transactions; immutable once committed except splits columns
            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY,
                fingerprint TEXT NOT NULL,
                organization_id INTEGER NOT NULL,
                account_id INTEGER REFERENCES accounts(id),
                provider TEXT NOT NULL,
                provider_transaction_id TEXT NOT NULL,
                amount_cents INTEGER NOT NULL,             -- signed; negative = outflow
                posted_date DATE NOT NULL,
                merchant_raw TEXT NOT NULL,
                merchant_normalized TEXT NOT NULL,
                location TEXT,                             -- JSON, location-capable providers only
                splits TEXT NOT NULL,                      -- JSON CategorySplit list
                splits_user_corrected INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(organization_id, fingerprint)       -- the dedup key for merge
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_org_date ON transactions(organization_id, posted_date);
            CREATE INDEX IF NOT EXISTS idx_transactions_merchant ON transactions(merchant_normalized);
            CREATE INDEX IF NOT EXISTS idx_transactions_account ON transactions(account_id);

            -- OAuth credentials, one live row per (organization, provider);
            -- superseded in place on refresh, never appended
            CREATE TABLE IF NOT EXISTS integration_tokens (
                id INTEGER PRIMARY KEY,
                organization_id INTEGER NOT NULL,
                provider TEXT NOT NULL,
                access_token TEXT NOT NULL,
                refresh_token TEXT,
                expires_at DATETIME,
                status TEXT NOT NULL DEFAULT 'active',     -- active, invalid
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(organization_id, provider)
            );

            -- Which providers an organization has linked
            CREATE TABLE IF NOT EXISTS provider_links (
                id INTEGER PRIMARY KEY,
                organization_id INTEGER NOT NULL,
                provider TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(organization_id, provider)
            );

            -- Append-only user categorization corrections; never edited or
            -- deleted, also the future model training signal
            CREATE TABLE IF NOT EXISTS categorization_feedback (
                id INTEGER PRIMARY KEY,
                fingerprint TEXT NOT NULL,
                original_splits TEXT NOT NULL,             -- JSON CategorySplit list
                corrected_splits TEXT NOT NULL,            -- JSON CategorySplit list
                feedback_type TEXT NOT NULL,               -- manual_edit, quick_accept, quick_reject
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_feedback_fingerprint ON categorization_feedback(fingerprint);
            "#,
        )?;

        info!("Database migrations complete");
        Ok(())
    }
}
