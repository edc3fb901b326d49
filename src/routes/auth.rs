use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use validator::Validate;

use crate::{
    dto::auth_dto::{
        PasswordResetConfirmPayload, PasswordResetPayload, SignInPayload, SignUpPayload,
    },
    error::Result,
    AppState,
};

#[utoipa::path(
    post,
    path = "/api/auth/sign-up",
    request_body = SignUpPayload,
    responses(
        (status = 201, description = "Account created, session issued", body = Json<SessionResponse>),
        (status = 400, description = "Invalid payload"),
        (status = 409, description = "Email already registered")
    )
)]
#[axum::debug_handler]
pub async fn sign_up(
    State(state): State<AppState>,
    Json(payload): Json<SignUpPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let session = state.auth.sign_up(payload).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

#[utoipa::path(
    post,
    path = "/api/auth/sign-in",
    request_body = SignInPayload,
    responses(
        (status = 200, description = "Session issued", body = Json<SessionResponse>),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account suspended or banned")
    )
)]
#[axum::debug_handler]
pub async fn sign_in(
    State(state): State<AppState>,
    Json(payload): Json<SignInPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let session = state.auth.sign_in(payload).await?;
    Ok(Json(session))
}

/// Always 202, whether or not the address has an account.
#[utoipa::path(
    post,
    path = "/api/auth/password-reset",
    request_body = PasswordResetPayload,
    responses(
        (status = 202, description = "Reset link sent if the account exists", body = Json<serde_json::Value>)
    )
)]
#[axum::debug_handler]
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    state.auth.request_password_reset(&payload.email).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "message": "If an account exists, a reset link has been sent." })),
    ))
}

#[utoipa::path(
    post,
    path = "/api/auth/password-reset/confirm",
    request_body = PasswordResetConfirmPayload,
    responses(
        (status = 200, description = "Password changed", body = Json<serde_json::Value>),
        (status = 400, description = "Invalid or expired token")
    )
)]
#[axum::debug_handler]
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetConfirmPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    state.auth.confirm_password_reset(payload).await?;
    Ok(Json(json!({ "success": true })))
}
