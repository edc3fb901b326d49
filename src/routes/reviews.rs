use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use validator::Validate;

use crate::{
    dto::review_dto::CreateReviewPayload, error::Result, middleware::auth::Claims, AppState,
};

#[utoipa::path(
    post,
    path = "/api/reviews",
    request_body = CreateReviewPayload,
    responses(
        (status = 201, description = "Review posted", body = Json<Review>),
        (status = 400, description = "Rating out of range"),
        (status = 409, description = "Already reviewed")
    )
)]
#[axum::debug_handler]
pub async fn create_review(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateReviewPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let review = state.reviews.create(claims.profile_id, payload).await?;
    Ok((StatusCode::CREATED, Json(review)))
}
