use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{AppError, Result};

/// How a device proves possession of its credential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionMode {
    Pin,
    Fingerprint,
}

impl InteractionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionMode::Pin => "pin",
            InteractionMode::Fingerprint => "fingerprint",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pin" => Ok(InteractionMode::Pin),
            "fingerprint" => Ok(InteractionMode::Fingerprint),
            other => Err(AppError::BadRequest(format!(
                "Unknown interaction mode: {}",
                other
            ))),
        }
    }
}

/// Device credential record. Exactly one of `password_hash` and `public_key`
/// is set; which one determines the interaction mode.
#[derive(Debug, Clone, FromRow)]
pub struct Device {
    pub id: String,
    pub user_id: String,
    pub device_id: String,
    pub name: String,
    pub platform: String,
    pub password_hash: Option<String>,
    pub public_key: Option<String>,
    pub metadata: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Device {
    pub fn interaction_mode(&self) -> InteractionMode {
        if self.password_hash.is_some() {
            InteractionMode::Pin
        } else {
            InteractionMode::Fingerprint
        }
    }
}

/// Structured extra data attached to a device registration. Known fields
/// only; anything else a client sends is dropped, not stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Init Registration request
#[derive(Debug, Deserialize)]
pub struct InitRegistrationRequest {
    pub client_id: String,
    pub interaction_mode: InteractionMode,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub code_challenge: String,
}

/// Complete Registration request. `challenge` carries the token issued by
/// Init Registration and is only expected in fingerprint mode.
#[derive(Debug, Deserialize)]
pub struct CompleteRegistrationRequest {
    #[serde(default)]
    pub challenge: Option<String>,
    pub device_id: String,
    #[serde(default)]
    pub device_name: String,
    #[serde(default)]
    pub platform: String,
    pub interaction_mode: InteractionMode,
    #[serde(default)]
    pub pin: Option<String>,
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub metadata: Option<DeviceMetadata>,
}

/// Device Authorization request. Called without an interactive session;
/// the credential proof is the authentication.
#[derive(Debug, Deserialize)]
pub struct DeviceAuthorizationRequest {
    pub client_id: String,
    pub device_id: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub code_challenge: String,
    #[serde(default)]
    pub pin: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
}

/// Challenge response for Init Registration and Device Authorization.
/// Empty for the pin branch of Init Registration, which pre-issues nothing.
#[derive(Debug, Serialize)]
pub struct ChallengeResponse {
    pub challenge: String,
}

/// Complete Registration response
#[derive(Debug, Serialize)]
pub struct RegistrationResponse {
    pub device_registration_id: String,
}
