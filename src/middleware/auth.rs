use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, DecodingKey, Validation};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{Claims, CurrentUser};
use crate::AppState;

/// Authentication middleware for the session-bound registration steps.
/// Extracts and validates the interactive-session JWT from the
/// Authorization header; the token is minted by the surrounding
/// authorization server, not by this service.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> std::result::Result<Response, AppError> {
    // Get Authorization header
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok());

    let token = match auth_header {
        Some(header) if header.starts_with("Bearer ") => &header[7..],
        _ => {
            return Err(AppError::Unauthorized(
                "Missing or invalid Authorization header".to_string(),
            ));
        }
    };

    let claims = validate_token(token, &state.config)?;

    let current_user = CurrentUser { id: claims.sub };
    request.extensions_mut().insert(current_user);

    Ok(next.run(request).await)
}

/// Validate a session token and extract claims, trying the current secret
/// and any configured previous secrets (rotation support).
pub fn validate_token(token: &str, config: &Config) -> Result<Claims> {
    let mut validation = Validation::default();
    validation.validate_exp = true;

    let keys = std::iter::once(config.jwt.secret.as_str())
        .chain(config.jwt.previous_secrets.iter().map(|s| s.as_str()));

    for secret in keys {
        if let Ok(token_data) = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        ) {
            return Ok(token_data.claims);
        }
    }

    Err(AppError::Unauthorized("Invalid token".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token_for(secret: &str, sub: &str) -> String {
        let now = Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: sub.to_string(),
            exp: now + 600,
            iat: now,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn accepts_current_and_previous_secrets() {
        let mut config = Config::for_tests();
        config.jwt.secret = "current".to_string();
        config.jwt.previous_secrets = vec!["old".to_string()];

        let claims = validate_token(&token_for("current", "user-1"), &config).unwrap();
        assert_eq!(claims.sub, "user-1");

        let claims = validate_token(&token_for("old", "user-1"), &config).unwrap();
        assert_eq!(claims.sub, "user-1");

        assert!(validate_token(&token_for("forged", "user-1"), &config).is_err());
    }
}
