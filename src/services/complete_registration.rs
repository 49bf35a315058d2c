use base64::Engine;
use chrono::SecondsFormat;
use uuid::Uuid;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{
    CompleteRegistrationRequest, CurrentUser, Device, DeviceMetadata, InteractionMode,
    RegistrationResponse,
};
use crate::services::challenge::ChallengeStore;
use crate::services::clock::Clock;
use crate::services::device::DeviceStore;
use crate::services::hasher::DevicePasswordHasher;

const PIN_MIN_DIGITS: usize = 4;
const PIN_MAX_DIGITS: usize = 8;

/// Credential material extracted from a completion request
#[derive(Debug)]
pub enum ValidatedCredential {
    Pin { raw_pin: String },
    Fingerprint { public_key: String },
}

/// Outcome of validating a Complete Registration request. `existing` is set
/// when this is a re-registration (PIN or key rotation) rather than a first
/// pairing, which decides create vs. update in the generator.
#[derive(Debug)]
pub struct ValidatedCompleteRegistration {
    pub subject: String,
    pub device_id: String,
    pub device_name: String,
    pub platform: String,
    pub metadata: Option<DeviceMetadata>,
    pub credential: ValidatedCredential,
    pub existing: Option<Device>,
}

/// Second step of the pairing flow, session-authenticated. The fingerprint
/// branch additionally redeems the challenge issued by Init Registration.
pub struct CompleteRegistrationValidator;

impl CompleteRegistrationValidator {
    pub async fn validate(
        db: &Database,
        clock: &dyn Clock,
        current_user: &CurrentUser,
        req: &CompleteRegistrationRequest,
    ) -> Result<ValidatedCompleteRegistration> {
        if req.device_id.trim().is_empty() {
            return Err(AppError::BadRequest("Missing device id".to_string()));
        }

        let credential = match req.interaction_mode {
            InteractionMode::Pin => {
                let pin = req
                    .pin
                    .as_deref()
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| AppError::BadRequest("Missing PIN".to_string()))?;
                Self::check_pin_complexity(pin)?;
                ValidatedCredential::Pin {
                    raw_pin: pin.to_string(),
                }
            }
            InteractionMode::Fingerprint => {
                let token = req
                    .challenge
                    .as_deref()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .ok_or(AppError::MissingChallenge)?;

                // Single-use: the token is gone after this regardless of
                // whether the rest of the request validates.
                let code = ChallengeStore::redeem(db, clock, token).await?;

                if code.interaction_mode != InteractionMode::Fingerprint {
                    return Err(AppError::BadRequest(
                        "Challenge interaction mode mismatch".to_string(),
                    ));
                }
                // A challenge bound to another principal is indistinguishable
                // from a missing one.
                if code.subject != current_user.id {
                    return Err(AppError::ChallengeNotFound);
                }
                if !code.device_id.is_empty() && code.device_id != req.device_id {
                    return Err(AppError::BadRequest(
                        "Challenge is bound to a different device".to_string(),
                    ));
                }

                let public_key = req
                    .public_key
                    .as_deref()
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .ok_or_else(|| AppError::BadRequest("Missing public key".to_string()))?;
                Self::check_public_key(public_key)?;
                ValidatedCredential::Fingerprint {
                    public_key: public_key.to_string(),
                }
            }
        };

        let existing = DeviceStore::find_device(db, &current_user.id, &req.device_id).await?;
        if let Some(device) = &existing {
            if device.interaction_mode() != req.interaction_mode {
                return Err(AppError::BadRequest(
                    "Interaction mode cannot change on re-registration".to_string(),
                ));
            }
        }

        Ok(ValidatedCompleteRegistration {
            subject: current_user.id.clone(),
            device_id: req.device_id.clone(),
            device_name: req.device_name.clone(),
            platform: req.platform.clone(),
            metadata: req.metadata.clone(),
            credential,
            existing,
        })
    }

    fn check_pin_complexity(pin: &str) -> Result<()> {
        let digits_only = pin.chars().all(|c| c.is_ascii_digit());
        if !digits_only || pin.len() < PIN_MIN_DIGITS || pin.len() > PIN_MAX_DIGITS {
            return Err(AppError::BadRequest(format!(
                "PIN must be {}-{} digits",
                PIN_MIN_DIGITS, PIN_MAX_DIGITS
            )));
        }
        Ok(())
    }

    fn check_public_key(public_key: &str) -> Result<()> {
        let engine = &base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let std_engine = &base64::engine::general_purpose::STANDARD;
        let decoded = engine
            .decode(public_key)
            .or_else(|_| std_engine.decode(public_key));
        match decoded {
            Ok(bytes) if !bytes.is_empty() => Ok(()),
            _ => Err(AppError::BadRequest("Malformed public key".to_string())),
        }
    }
}

pub struct CompleteRegistrationResponseGenerator;

impl CompleteRegistrationResponseGenerator {
    /// Four cases: new pin device, pin rotation, new fingerprint device, key
    /// rotation. Each performs exactly one store mutation; store conflicts
    /// surface as-is, never retried here.
    pub async fn process(
        db: &Database,
        clock: &dyn Clock,
        validated: ValidatedCompleteRegistration,
    ) -> Result<RegistrationResponse> {
        let device_pk = match (&validated.credential, &validated.existing) {
            (ValidatedCredential::Pin { raw_pin }, None) => {
                let id = Uuid::new_v4().to_string();
                let hash = DevicePasswordHasher::hash_password(&id, raw_pin)?;
                let device = Self::new_record(&validated, id.clone(), Some(hash), None, clock);
                DeviceStore::create_device(db, &device).await?;
                tracing::info!(user_id = %validated.subject, "Registered pin device");
                id
            }
            (ValidatedCredential::Pin { raw_pin }, Some(existing)) => {
                let hash = DevicePasswordHasher::hash_password(&existing.id, raw_pin)?;
                DeviceStore::update_password(db, &existing.id, &hash).await?;
                tracing::info!(user_id = %validated.subject, "Rotated device PIN");
                existing.id.clone()
            }
            (ValidatedCredential::Fingerprint { public_key }, None) => {
                let id = Uuid::new_v4().to_string();
                let device = Self::new_record(
                    &validated,
                    id.clone(),
                    None,
                    Some(public_key.clone()),
                    clock,
                );
                DeviceStore::create_device(db, &device).await?;
                tracing::info!(user_id = %validated.subject, "Registered fingerprint device");
                id
            }
            (ValidatedCredential::Fingerprint { public_key }, Some(existing)) => {
                DeviceStore::update_public_key(db, &existing.id, public_key).await?;
                tracing::info!(user_id = %validated.subject, "Rotated device public key");
                existing.id.clone()
            }
        };

        Ok(RegistrationResponse {
            device_registration_id: device_pk,
        })
    }

    fn new_record(
        validated: &ValidatedCompleteRegistration,
        id: String,
        password_hash: Option<String>,
        public_key: Option<String>,
        clock: &dyn Clock,
    ) -> Device {
        let now = clock.now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let metadata = validated
            .metadata
            .as_ref()
            .and_then(|m| serde_json::to_string(m).ok());
        Device {
            id,
            user_id: validated.subject.clone(),
            device_id: validated.device_id.clone(),
            name: validated.device_name.clone(),
            platform: validated.platform.clone(),
            password_hash,
            public_key,
            metadata,
            is_active: true,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}
