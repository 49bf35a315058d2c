use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::models::{
    ChallengeResponse, CurrentUser, DeviceAuthenticationCode, InitRegistrationRequest,
    InteractionMode,
};
use crate::services::challenge::ChallengeStore;
use crate::services::clock::Clock;
use crate::services::policy::ClientPolicy;

/// Outcome of validating an Init Registration request. Carries no device
/// reference: none may exist yet.
#[derive(Debug)]
pub struct ValidatedInitRegistration {
    pub subject: String,
    pub client_id: String,
    pub code_lifetime_secs: i64,
    pub scopes: Vec<String>,
    pub code_challenge: String,
    pub interaction_mode: InteractionMode,
}

/// First step of the pairing flow. Requires an interactive session: device
/// trust is bootstrapped from an already-authenticated context.
pub struct InitRegistrationValidator;

impl InitRegistrationValidator {
    pub fn validate(
        config: &Config,
        current_user: &CurrentUser,
        req: &InitRegistrationRequest,
    ) -> Result<ValidatedInitRegistration> {
        let client = ClientPolicy::require_client(config, &req.client_id)?;
        ClientPolicy::require_scopes(client, &req.scopes)?;
        ClientPolicy::require_code_challenge(&req.code_challenge)?;

        Ok(ValidatedInitRegistration {
            subject: current_user.id.clone(),
            client_id: client.client_id.clone(),
            code_lifetime_secs: client.code_lifetime_secs,
            scopes: req.scopes.clone(),
            code_challenge: req.code_challenge.clone(),
            interaction_mode: req.interaction_mode,
        })
    }
}

pub struct InitRegistrationResponseGenerator;

impl InitRegistrationResponseGenerator {
    /// Fingerprint pairing pre-issues a challenge bound to the session
    /// principal, with no device id yet. The pin branch has nothing to
    /// pre-issue: the PIN itself only arrives with Complete Registration.
    pub async fn process(
        db: &Database,
        clock: &dyn Clock,
        validated: ValidatedInitRegistration,
    ) -> Result<ChallengeResponse> {
        match validated.interaction_mode {
            InteractionMode::Pin => Ok(ChallengeResponse {
                challenge: String::new(),
            }),
            InteractionMode::Fingerprint => {
                let code = DeviceAuthenticationCode {
                    client_id: validated.client_id,
                    code_challenge: validated.code_challenge,
                    device_id: String::new(),
                    interaction_mode: InteractionMode::Fingerprint,
                    requested_scopes: validated.scopes,
                    subject: validated.subject,
                    created_at: clock.now(),
                    lifetime_secs: validated.code_lifetime_secs,
                };
                let challenge = ChallengeStore::generate_challenge(db, clock, code).await?;
                Ok(ChallengeResponse { challenge })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::services::clock::SystemClock;

    fn request(mode: InteractionMode) -> InitRegistrationRequest {
        InitRegistrationRequest {
            client_id: "mobile-app".to_string(),
            interaction_mode: mode,
            scopes: vec!["profile".to_string()],
            code_challenge: "a".repeat(64),
        }
    }

    fn principal() -> CurrentUser {
        CurrentUser {
            id: "user-1".to_string(),
        }
    }

    #[test]
    fn rejects_unknown_client() {
        let config = Config::for_tests();
        let mut req = request(InteractionMode::Pin);
        req.client_id = "rogue".to_string();

        let err = InitRegistrationValidator::validate(&config, &principal(), &req);
        assert!(matches!(err, Err(AppError::InvalidClient(_))));
    }

    #[test]
    fn rejects_scope_outside_client_policy() {
        let config = Config::for_tests();
        let mut req = request(InteractionMode::Pin);
        req.scopes.push("payments".to_string());

        let err = InitRegistrationValidator::validate(&config, &principal(), &req);
        assert!(matches!(err, Err(AppError::InvalidScope(_))));
    }

    #[test]
    fn rejects_missing_code_challenge() {
        let config = Config::for_tests();
        let mut req = request(InteractionMode::Fingerprint);
        req.code_challenge = String::new();

        let err = InitRegistrationValidator::validate(&config, &principal(), &req);
        assert!(matches!(err, Err(AppError::MissingChallenge)));
    }

    #[tokio::test]
    async fn pin_mode_issues_nothing() {
        let db = Database::new_in_memory().await;
        let config = Config::for_tests();

        let validated =
            InitRegistrationValidator::validate(&config, &principal(), &request(InteractionMode::Pin))
                .unwrap();
        let response = InitRegistrationResponseGenerator::process(&db, &SystemClock, validated)
            .await
            .unwrap();
        assert!(response.challenge.is_empty());

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM device_auth_codes")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn fingerprint_mode_issues_subject_bound_challenge() {
        let db = Database::new_in_memory().await;
        let config = Config::for_tests();
        let clock = SystemClock;

        let validated = InitRegistrationValidator::validate(
            &config,
            &principal(),
            &request(InteractionMode::Fingerprint),
        )
        .unwrap();
        let response = InitRegistrationResponseGenerator::process(&db, &clock, validated)
            .await
            .unwrap();
        assert!(!response.challenge.is_empty());

        let code = ChallengeStore::redeem(&db, &clock, &response.challenge)
            .await
            .unwrap();
        assert_eq!(code.subject, "user-1");
        assert_eq!(code.interaction_mode, InteractionMode::Fingerprint);
        assert!(code.device_id.is_empty());
        assert_eq!(code.requested_scopes, vec!["profile".to_string()]);
    }
}
