use base64::Engine;

use crate::config::{ClientConfig, Config};
use crate::error::{AppError, Result};

/// Client-policy checks shared by every protocol step. Policy is consumed
/// from configuration, never defined here.
pub struct ClientPolicy;

impl ClientPolicy {
    /// The client must exist and be permitted to use the device grant.
    pub fn require_client<'a>(config: &'a Config, client_id: &str) -> Result<&'a ClientConfig> {
        let client = config
            .find_client(client_id)
            .ok_or_else(|| AppError::InvalidClient(client_id.to_string()))?;

        if !client.allow_device_grant {
            return Err(AppError::InvalidClient(client_id.to_string()));
        }

        Ok(client)
    }

    /// Requested scopes must be a subset of what the client may request.
    pub fn require_scopes(client: &ClientConfig, scopes: &[String]) -> Result<()> {
        for scope in scopes {
            if !client.allowed_scopes.iter().any(|s| s == scope) {
                return Err(AppError::InvalidScope(scope.clone()));
            }
        }
        Ok(())
    }

    /// A code challenge is the SHA-256 digest of the client's verifier:
    /// 64 hex characters, or base64url (no padding) decoding to 32 bytes.
    pub fn require_code_challenge(code_challenge: &str) -> Result<()> {
        let value = code_challenge.trim();
        if value.is_empty() {
            return Err(AppError::MissingChallenge);
        }

        if value.len() == 64 && value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Ok(());
        }

        match base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(value) {
            Ok(bytes) if bytes.len() == 32 => Ok(()),
            _ => Err(AppError::MissingChallenge),
        }
    }
}
