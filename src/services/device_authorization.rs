use base64::Engine;

use crate::config::Config;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{
    ChallengeResponse, Device, DeviceAuthenticationCode, DeviceAuthorizationRequest,
    InteractionMode,
};
use crate::services::challenge::ChallengeStore;
use crate::services::clock::Clock;
use crate::services::device::DeviceStore;
use crate::services::hasher::DevicePasswordHasher;
use crate::services::policy::ClientPolicy;

/// Outcome of validating a Device Authorization request
#[derive(Debug)]
pub struct ValidatedDeviceAuthorization {
    pub device: Device,
    pub client_id: String,
    pub code_lifetime_secs: i64,
    pub scopes: Vec<String>,
    pub code_challenge: String,
}

/// Login step for an already-registered device. Called without an
/// interactive session: possession of the device credential is the
/// authentication, and the owning user comes from the device record.
pub struct DeviceAuthorizationValidator;

impl DeviceAuthorizationValidator {
    pub async fn validate(
        db: &Database,
        config: &Config,
        req: &DeviceAuthorizationRequest,
    ) -> Result<ValidatedDeviceAuthorization> {
        let client = ClientPolicy::require_client(config, &req.client_id)?;
        // Scopes are re-validated against current client policy at every
        // login, not against the snapshot recorded at registration.
        ClientPolicy::require_scopes(client, &req.scopes)?;
        ClientPolicy::require_code_challenge(&req.code_challenge)?;

        // DeviceNotFound and a wrong credential must be indistinguishable in
        // the response; both surface as InvalidCredential at the boundary.
        let device = DeviceStore::find_by_device_id(db, &req.device_id)
            .await?
            .ok_or(AppError::DeviceNotFound)?;

        if !device.is_active {
            tracing::warn!(device_id = %req.device_id, "Authorization attempt on inactive device");
            return Err(AppError::InvalidCredential);
        }

        match device.interaction_mode() {
            InteractionMode::Pin => {
                let pin = req
                    .pin
                    .as_deref()
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .ok_or(AppError::InvalidCredential)?;
                let hash = device
                    .password_hash
                    .as_deref()
                    .ok_or(AppError::InvalidCredential)?;
                if !DevicePasswordHasher::verify_password(&device.id, hash, pin)? {
                    tracing::warn!(device_id = %req.device_id, "PIN verification failed");
                    return Err(AppError::InvalidCredential);
                }
            }
            InteractionMode::Fingerprint => {
                // Structural check only. Cryptographic verification of the
                // signature against the stored public key happens in the
                // token endpoint when the challenge is redeemed.
                let signature = req
                    .signature
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or(AppError::InvalidCredential)?;
                Self::check_signature_shape(signature)?;
            }
        }

        Ok(ValidatedDeviceAuthorization {
            device,
            client_id: client.client_id.clone(),
            code_lifetime_secs: client.code_lifetime_secs,
            scopes: req.scopes.clone(),
            code_challenge: req.code_challenge.clone(),
        })
    }

    fn check_signature_shape(signature: &str) -> Result<()> {
        let engine = &base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let std_engine = &base64::engine::general_purpose::STANDARD;
        let decoded = engine
            .decode(signature)
            .or_else(|_| std_engine.decode(signature));
        match decoded {
            Ok(bytes) if !bytes.is_empty() => Ok(()),
            _ => Err(AppError::InvalidCredential),
        }
    }
}

pub struct DeviceAuthorizationResponseGenerator;

impl DeviceAuthorizationResponseGenerator {
    /// Issue a fresh single-use code bound to the found device's durable id
    /// and the owning user. The client forwards the returned token to the
    /// token endpoint for exchange.
    pub async fn process(
        db: &Database,
        clock: &dyn Clock,
        validated: ValidatedDeviceAuthorization,
    ) -> Result<ChallengeResponse> {
        let code = DeviceAuthenticationCode {
            client_id: validated.client_id,
            code_challenge: validated.code_challenge,
            device_id: validated.device.id.clone(),
            interaction_mode: validated.device.interaction_mode(),
            requested_scopes: validated.scopes,
            subject: validated.device.user_id.clone(),
            created_at: clock.now(),
            lifetime_secs: validated.code_lifetime_secs,
        };
        let challenge = ChallengeStore::generate_challenge(db, clock, code).await?;
        Ok(ChallengeResponse { challenge })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CompleteRegistrationRequest, CurrentUser};
    use crate::services::clock::SystemClock;
    use crate::services::complete_registration::{
        CompleteRegistrationResponseGenerator, CompleteRegistrationValidator,
    };

    async fn register_pin_device(db: &Database, device_id: &str, pin: &str) -> String {
        let validated = CompleteRegistrationValidator::validate(
            db,
            &SystemClock,
            &CurrentUser {
                id: "user-1".to_string(),
            },
            &CompleteRegistrationRequest {
                challenge: None,
                device_id: device_id.to_string(),
                device_name: "Pixel".to_string(),
                platform: "android".to_string(),
                interaction_mode: InteractionMode::Pin,
                pin: Some(pin.to_string()),
                public_key: None,
                metadata: None,
            },
        )
        .await
        .unwrap();
        CompleteRegistrationResponseGenerator::process(db, &SystemClock, validated)
            .await
            .unwrap()
            .device_registration_id
    }

    fn request(device_id: &str, pin: Option<&str>) -> DeviceAuthorizationRequest {
        DeviceAuthorizationRequest {
            client_id: "mobile-app".to_string(),
            device_id: device_id.to_string(),
            scopes: vec!["openid".to_string()],
            code_challenge: "b".repeat(64),
            pin: pin.map(|p| p.to_string()),
            signature: None,
        }
    }

    #[tokio::test]
    async fn pin_login_issues_single_use_challenge() {
        let db = Database::new_in_memory().await;
        let config = Config::for_tests();
        let clock = SystemClock;
        let registration_id = register_pin_device(&db, "install-1", "4711").await;

        let validated =
            DeviceAuthorizationValidator::validate(&db, &config, &request("install-1", Some("4711")))
                .await
                .unwrap();
        let response = DeviceAuthorizationResponseGenerator::process(&db, &clock, validated)
            .await
            .unwrap();

        let code = ChallengeStore::redeem(&db, &clock, &response.challenge)
            .await
            .unwrap();
        assert_eq!(code.device_id, registration_id);
        assert_eq!(code.subject, "user-1");
        assert_eq!(code.interaction_mode, InteractionMode::Pin);

        // Redeeming again fails: the code is spent.
        let replay = ChallengeStore::redeem(&db, &clock, &response.challenge).await;
        assert!(matches!(replay, Err(AppError::ChallengeNotFound)));
    }

    #[tokio::test]
    async fn wrong_pin_issues_no_challenge() {
        let db = Database::new_in_memory().await;
        let config = Config::for_tests();
        register_pin_device(&db, "install-1", "4711").await;

        let err =
            DeviceAuthorizationValidator::validate(&db, &config, &request("install-1", Some("0000")))
                .await;
        assert!(matches!(err, Err(AppError::InvalidCredential)));

        // The challenge store saw no generate call.
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM device_auth_codes")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn unknown_device_and_wrong_pin_render_identically() {
        use axum::response::IntoResponse;

        let db = Database::new_in_memory().await;
        let config = Config::for_tests();
        register_pin_device(&db, "install-1", "4711").await;

        let missing =
            DeviceAuthorizationValidator::validate(&db, &config, &request("no-such", Some("4711")))
                .await
                .unwrap_err();
        let wrong =
            DeviceAuthorizationValidator::validate(&db, &config, &request("install-1", Some("0000")))
                .await
                .unwrap_err();

        let a = missing.into_response();
        let b = wrong.into_response();
        assert_eq!(a.status(), b.status());
    }

    #[tokio::test]
    async fn missing_proof_is_invalid_credential() {
        let db = Database::new_in_memory().await;
        let config = Config::for_tests();
        register_pin_device(&db, "install-1", "4711").await;

        let err =
            DeviceAuthorizationValidator::validate(&db, &config, &request("install-1", None)).await;
        assert!(matches!(err, Err(AppError::InvalidCredential)));
    }

    #[tokio::test]
    async fn scopes_are_checked_at_login_time() {
        let db = Database::new_in_memory().await;
        let config = Config::for_tests();
        register_pin_device(&db, "install-1", "4711").await;

        let mut req = request("install-1", Some("4711"));
        req.scopes.push("payments".to_string());
        let err = DeviceAuthorizationValidator::validate(&db, &config, &req).await;
        assert!(matches!(err, Err(AppError::InvalidScope(_))));
    }

    #[tokio::test]
    async fn fingerprint_proof_must_be_well_formed() {
        let db = Database::new_in_memory().await;
        let config = Config::for_tests();
        let clock = SystemClock;

        // Register a fingerprint device directly through the store.
        let device =
            crate::services::device::test_support::sample_device("user-1", "install-2", InteractionMode::Fingerprint);
        DeviceStore::create_device(&db, &device).await.unwrap();

        let mut req = request("install-2", None);
        req.signature = Some("!!!not-base64!!!".to_string());
        let err = DeviceAuthorizationValidator::validate(&db, &config, &req).await;
        assert!(matches!(err, Err(AppError::InvalidCredential)));

        req.signature = Some("c2lnbmF0dXJlLWJ5dGVz".to_string());
        let validated = DeviceAuthorizationValidator::validate(&db, &config, &req)
            .await
            .unwrap();
        let response = DeviceAuthorizationResponseGenerator::process(&db, &clock, validated)
            .await
            .unwrap();
        let code = ChallengeStore::redeem(&db, &clock, &response.challenge)
            .await
            .unwrap();
        assert_eq!(code.interaction_mode, InteractionMode::Fingerprint);
        assert_eq!(code.device_id, device.id);
    }

    #[tokio::test]
    async fn inactive_device_cannot_authorize() {
        let db = Database::new_in_memory().await;
        let config = Config::for_tests();
        register_pin_device(&db, "install-1", "4711").await;

        sqlx::query("UPDATE devices SET is_active = 0 WHERE device_id = ?")
            .bind("install-1")
            .execute(db.pool())
            .await
            .unwrap();

        let err =
            DeviceAuthorizationValidator::validate(&db, &config, &request("install-1", Some("4711")))
                .await;
        assert!(matches!(err, Err(AppError::InvalidCredential)));
    }
}
