use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;

use crate::{
    dto::payment_dto::{
        ExistingPaymentQuery, PaymentDraft, PaymentHistoryQuery, PaymentHistoryResponse,
    },
    error::Result,
    middleware::auth::Claims,
    AppState,
};

#[utoipa::path(
    post,
    path = "/api/payments",
    request_body = PaymentDraft,
    responses(
        (status = 201, description = "Payment created", body = Json<Payment>),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Already paid for this job")
    )
)]
#[axum::debug_handler]
pub async fn create_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(draft): Json<PaymentDraft>,
) -> Result<impl IntoResponse> {
    let payment = state.payments.create(claims.profile_id, draft).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

/// The caller's payment to `payee_id` for `job_id`, or `null`.
#[utoipa::path(
    get,
    path = "/api/payments/existing",
    params(
        ("job_id" = Uuid, Query, description = "Job ID"),
        ("payee_id" = Uuid, Query, description = "Payee profile ID")
    ),
    responses(
        (status = 200, description = "Existing payment for the job and payee, or null", body = Json<Payment>)
    )
)]
#[axum::debug_handler]
pub async fn existing_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ExistingPaymentQuery>,
) -> Result<impl IntoResponse> {
    let payment = state
        .payments
        .find_existing(claims.profile_id, query.job_id, query.payee_id)
        .await?;
    Ok(Json(payment))
}

#[utoipa::path(
    get,
    path = "/api/payments",
    params(
        ("filter" = Option<String>, Query, description = "all, sent, received or pending")
    ),
    responses(
        (status = 200, description = "Transaction history", body = Json<PaymentHistoryResponse>)
    )
)]
#[axum::debug_handler]
pub async fn history(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<PaymentHistoryQuery>,
) -> Result<impl IntoResponse> {
    let items = state
        .payments
        .history(claims.profile_id, query.filter.unwrap_or_default())
        .await?;
    Ok(Json(PaymentHistoryResponse { items }))
}

#[utoipa::path(
    post,
    path = "/api/payments/{id}/confirm",
    params(
        ("id" = Uuid, Path, description = "Payment ID")
    ),
    responses(
        (status = 200, description = "Cash payment confirmed", body = Json<Payment>),
        (status = 403, description = "Only the payee can confirm"),
        (status = 404, description = "Payment not found")
    )
)]
#[axum::debug_handler]
pub async fn confirm_receipt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let payment = state.payments.confirm_receipt(claims.profile_id, id).await?;
    Ok(Json(payment))
}
