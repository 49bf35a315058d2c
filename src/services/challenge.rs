use chrono::SecondsFormat;
use uuid::Uuid;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{join_scopes, DeviceAuthCodeRow, DeviceAuthenticationCode};
use crate::services::clock::Clock;

/// Code Challenge Store: persists single-use challenge artifacts.
///
/// The opaque token handed to the client is a fresh UUID; only its SHA-256
/// digest is stored, so the table alone cannot be replayed against redeem.
pub struct ChallengeStore;

impl ChallengeStore {
    /// Persist a code and return the opaque token the client presents later.
    pub async fn generate_challenge(
        db: &Database,
        clock: &dyn Clock,
        code: DeviceAuthenticationCode,
    ) -> Result<String> {
        let token = Uuid::new_v4().to_string();
        let token_hash = Self::hash_token(&token);

        sqlx::query(
            r#"
            INSERT INTO device_auth_codes
                (token_hash, client_id, code_challenge, device_id, interaction_mode,
                 requested_scopes, subject, created_at, lifetime_secs)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&token_hash)
        .bind(&code.client_id)
        .bind(&code.code_challenge)
        .bind(&code.device_id)
        .bind(code.interaction_mode.as_str())
        .bind(join_scopes(&code.requested_scopes))
        .bind(&code.subject)
        .bind(code.created_at.to_rfc3339_opts(SecondsFormat::Millis, true))
        .bind(code.lifetime_secs)
        .execute(db.pool())
        .await?;

        // Best-effort hygiene; correctness comes from the expiry check at
        // redemption, not from purge timing.
        let _ = Self::purge_expired(db, clock).await;

        tracing::debug!(
            client_id = %code.client_id,
            mode = code.interaction_mode.as_str(),
            "Issued device authentication code"
        );

        Ok(token)
    }

    /// Redeem a token: delete-and-return in one statement, then check expiry.
    /// A second redeem of the same token fails with `ChallengeNotFound` even
    /// if the first is still in flight.
    pub async fn redeem(
        db: &Database,
        clock: &dyn Clock,
        token: &str,
    ) -> Result<DeviceAuthenticationCode> {
        let token_hash = Self::hash_token(token);

        let row: Option<DeviceAuthCodeRow> = sqlx::query_as(
            "DELETE FROM device_auth_codes WHERE token_hash = ? RETURNING *",
        )
        .bind(&token_hash)
        .fetch_optional(db.pool())
        .await?;

        let code = row.ok_or(AppError::ChallengeNotFound)?.into_code()?;

        if code.is_expired(clock.now()) {
            return Err(AppError::ChallengeExpired);
        }

        Ok(code)
    }

    /// Drop codes that have outlived their lifetime
    pub async fn purge_expired(db: &Database, clock: &dyn Clock) -> Result<u64> {
        let now = clock.now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let result = sqlx::query(
            r#"
            DELETE FROM device_auth_codes
            WHERE datetime(created_at, '+' || lifetime_secs || ' seconds') <= datetime(?)
            "#,
        )
        .bind(&now)
        .execute(db.pool())
        .await?;

        Ok(result.rows_affected())
    }

    /// Hash token for storage
    fn hash_token(token: &str) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }
}
