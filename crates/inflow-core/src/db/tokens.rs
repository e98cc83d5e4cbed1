//! Integration token rows (backing store for the token vault)

use rusqlite::{params, OptionalExtension};

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{IntegrationTokens, Provider, TokenStatus};

impl Database {
    /// Current token record for an (organization, provider) pair
    pub fn get_tokens(
        &self,
        organization_id: i64,
        provider: Provider,
    ) -> Result<Option<(IntegrationTokens, TokenStatus)>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                r#"
                SELECT access_token, refresh_token, expires_at, status
                FROM integration_tokens
                WHERE organization_id = ? AND provider = ?
                "#,
                params![organization_id, provider.as_str()],
                |row| {
                    let expires_at: Option<String> = row.get(2)?;
                    let status_str: String = row.get(3)?;
                    Ok((
                        IntegrationTokens {
                            access_token: row.get(0)?,
                            refresh_token: row.get(1)?,
                            expires_at: expires_at.map(|s| parse_datetime(&s)),
                        },
                        status_str.parse().unwrap_or(TokenStatus::Invalid),
                    ))
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Atomically replace the token record (success path of a refresh, or
    /// the initial link). Resets status to active.
    pub fn replace_tokens(
        &self,
        organization_id: i64,
        provider: Provider,
        tokens: &IntegrationTokens,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO integration_tokens (
                organization_id, provider, access_token, refresh_token,
                expires_at, status, updated_at
            ) VALUES (?, ?, ?, ?, ?, 'active', CURRENT_TIMESTAMP)
            ON CONFLICT(organization_id, provider) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at,
                status = 'active',
                updated_at = CURRENT_TIMESTAMP
            "#,
            params![
                organization_id,
                provider.as_str(),
                tokens.access_token,
                tokens.refresh_token,
                tokens.expires_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Mark a token record invalid (refresh token revoked or expired).
    /// Terminal until the user re-authorizes and `replace_tokens` runs.
    pub fn mark_tokens_invalid(&self, organization_id: i64, provider: Provider) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            UPDATE integration_tokens
            SET status = 'invalid', updated_at = CURRENT_TIMESTAMP
            WHERE organization_id = ? AND provider = ?
            "#,
            params![organization_id, provider.as_str()],
        )?;
        Ok(())
    }
}
