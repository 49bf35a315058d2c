use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Unknown client: {0}")]
    InvalidClient(String),

    #[error("Scope not allowed: {0}")]
    InvalidScope(String),

    #[error("Missing or malformed code challenge")]
    MissingChallenge,

    #[error("Challenge not found")]
    ChallengeNotFound,

    #[error("Challenge expired")]
    ChallengeExpired,

    #[error("Invalid device credential")]
    InvalidCredential,

    // Renders identically to InvalidCredential so callers cannot probe
    // which device identifiers exist.
    #[error("Device not found")]
    DeviceNotFound,

    #[error("Device already registered")]
    DuplicateDevice,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

/// API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            message: "success".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: i32, message: &str) -> ApiResponse<()> {
        ApiResponse {
            code,
            message: message.to_string(),
            data: None,
        }
    }
}

/// Field-level validation error body, used for storage-constraint
/// violations that map back to a single request field.
#[derive(Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, 500, "Database error".to_string())
            }
            AppError::InvalidClient(id) => {
                (StatusCode::BAD_REQUEST, 400, format!("Unknown client: {}", id))
            }
            AppError::InvalidScope(scope) => {
                (StatusCode::BAD_REQUEST, 400, format!("Scope not allowed: {}", scope))
            }
            AppError::MissingChallenge => (
                StatusCode::BAD_REQUEST,
                400,
                "Missing or malformed code challenge".to_string(),
            ),
            AppError::ChallengeNotFound => {
                (StatusCode::BAD_REQUEST, 400, "Challenge not found".to_string())
            }
            AppError::ChallengeExpired => {
                (StatusCode::BAD_REQUEST, 400, "Challenge expired".to_string())
            }
            // DeviceNotFound and InvalidCredential collapse to one message:
            // the response must not reveal whether the device exists.
            AppError::InvalidCredential | AppError::DeviceNotFound => (
                StatusCode::UNAUTHORIZED,
                401,
                "Invalid device credential".to_string(),
            ),
            AppError::DuplicateDevice => {
                let body = Json(ApiResponse {
                    code: 409,
                    message: "Validation failed".to_string(),
                    data: Some(FieldError {
                        field: "device_id",
                        message: "Device already registered for this user".to_string(),
                    }),
                });
                return (StatusCode::CONFLICT, body).into_response();
            }
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, 401, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, 403, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, 400, msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, 500, msg.clone())
            }
            AppError::Jwt(e) => {
                tracing::warn!("JWT error: {:?}", e);
                (StatusCode::UNAUTHORIZED, 401, "Invalid token".to_string())
            }
        };

        let body = Json(ApiResponse::<()>::error(code, &message));
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
