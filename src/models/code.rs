use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;

use crate::models::InteractionMode;

/// A single-use challenge artifact. Created by Init Registration (fingerprint
/// pairing) or Device Authorization, redeemed exactly once by the token
/// endpoint or the registration completion path.
#[derive(Debug, Clone)]
pub struct DeviceAuthenticationCode {
    pub client_id: String,
    /// SHA-256 digest of the client's verifier, stored as supplied. The raw
    /// verifier never reaches the server.
    pub code_challenge: String,
    /// Empty during the very first Init Registration, before a device exists.
    pub device_id: String,
    pub interaction_mode: InteractionMode,
    pub requested_scopes: Vec<String>,
    /// The authenticated principal this code is bound to.
    pub subject: String,
    pub created_at: DateTime<Utc>,
    pub lifetime_secs: i64,
}

impl DeviceAuthenticationCode {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + Duration::seconds(self.lifetime_secs)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }
}

/// Persisted form of a challenge artifact
#[derive(Debug, Clone, FromRow)]
pub struct DeviceAuthCodeRow {
    pub token_hash: String,
    pub client_id: String,
    pub code_challenge: String,
    pub device_id: String,
    pub interaction_mode: String,
    pub requested_scopes: String,
    pub subject: String,
    pub created_at: String,
    pub lifetime_secs: i64,
}

impl DeviceAuthCodeRow {
    pub fn into_code(self) -> crate::error::Result<DeviceAuthenticationCode> {
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|_| {
                crate::error::AppError::Internal("Invalid code creation time".to_string())
            })?
            .with_timezone(&Utc);

        Ok(DeviceAuthenticationCode {
            client_id: self.client_id,
            code_challenge: self.code_challenge,
            device_id: self.device_id,
            interaction_mode: InteractionMode::from_str(&self.interaction_mode)?,
            requested_scopes: split_scopes(&self.requested_scopes),
            subject: self.subject,
            created_at,
            lifetime_secs: self.lifetime_secs,
        })
    }
}

pub fn join_scopes(scopes: &[String]) -> String {
    scopes.join(" ")
}

pub fn split_scopes(s: &str) -> Vec<String> {
    s.split_whitespace().map(|s| s.to_string()).collect()
}
