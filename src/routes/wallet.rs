use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};

use crate::{
    dto::payment_dto::TopUpDraft, error::Result, middleware::auth::Claims, AppState,
};

/// `get_or_create_wallet` for the caller.
#[utoipa::path(
    get,
    path = "/api/wallet",
    responses(
        (status = 200, description = "Wallet, created on first access", body = Json<Wallet>)
    )
)]
#[axum::debug_handler]
pub async fn get_wallet(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let wallet = state.wallets.get_or_create(claims.profile_id).await?;
    Ok(Json(wallet))
}

#[utoipa::path(
    post,
    path = "/api/wallet/top-up",
    request_body = TopUpDraft,
    responses(
        (status = 201, description = "Top-up recorded", body = Json<Payment>),
        (status = 400, description = "Invalid amount or missing reference")
    )
)]
#[axum::debug_handler]
pub async fn top_up(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(draft): Json<TopUpDraft>,
) -> Result<impl IntoResponse> {
    let payment = state.payments.top_up(claims.profile_id, draft).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}
