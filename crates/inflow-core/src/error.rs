//! Error types for inflow

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Refresh token rejected by the provider's token endpoint. Terminal per
    /// provider until the user re-authorizes; never retried.
    #[error("Provider authorization expired: {0}")]
    AuthExpired(String),

    /// Transient network failure or 5xx from a provider. Retried with
    /// backoff by the sync orchestrator.
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Provider asked us to slow down. Retried after the provider-supplied
    /// delay when one was given.
    #[error("Rate limited by provider (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    /// Malformed data from a provider or a caller (e.g. split percentages
    /// that do not sum to 100). The offending record is skipped, not fatal.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Fingerprint collision with incompatible immutable fields. The stored
    /// record wins; this surfaces the discrepancy.
    #[error("Store conflict: {0}")]
    StoreConflict(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Whether the sync orchestrator should retry the operation.
    ///
    /// Auth expiry is terminal per provider; validation and store conflicts
    /// are data problems a retry cannot fix.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::ProviderUnavailable(_) | Error::RateLimited { .. } | Error::Http(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
