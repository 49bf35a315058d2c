use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};

use crate::error::{ApiResponse, Result};
use crate::models::{
    ChallengeResponse, CompleteRegistrationRequest, CurrentUser, DeviceAuthorizationRequest,
    InitRegistrationRequest, RegistrationResponse,
};
use crate::services::{
    CompleteRegistrationResponseGenerator, CompleteRegistrationValidator,
    DeviceAuthorizationResponseGenerator, DeviceAuthorizationValidator,
    InitRegistrationResponseGenerator, InitRegistrationValidator,
};
use crate::AppState;

/// Start pairing a new device against the current session
/// POST /api/v1/device/registration/init
pub async fn init_registration(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<InitRegistrationRequest>,
) -> Result<Json<ApiResponse<ChallengeResponse>>> {
    let validated = InitRegistrationValidator::validate(&state.config, &current_user, &req)?;
    let response =
        InitRegistrationResponseGenerator::process(&state.db, state.clock.as_ref(), validated)
            .await?;
    Ok(Json(ApiResponse::success(response)))
}

/// Persist the device credential (first pairing or rotation)
/// POST /api/v1/device/registration/complete
pub async fn complete_registration(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<CompleteRegistrationRequest>,
) -> Result<impl IntoResponse> {
    let validated = CompleteRegistrationValidator::validate(
        &state.db,
        state.clock.as_ref(),
        &current_user,
        &req,
    )
    .await?;
    let response: RegistrationResponse =
        CompleteRegistrationResponseGenerator::process(&state.db, state.clock.as_ref(), validated)
            .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))))
}

/// Turn a locally-proven device credential into a fresh challenge
/// POST /api/v1/device/authorize
pub async fn authorize(
    State(state): State<AppState>,
    Json(req): Json<DeviceAuthorizationRequest>,
) -> Result<Json<ApiResponse<ChallengeResponse>>> {
    let validated = DeviceAuthorizationValidator::validate(&state.db, &state.config, &req).await?;
    let response =
        DeviceAuthorizationResponseGenerator::process(&state.db, state.clock.as_ref(), validated)
            .await?;
    Ok(Json(ApiResponse::success(response)))
}
