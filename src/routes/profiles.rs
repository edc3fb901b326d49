use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::profile_dto::{UpdateProfilePayload, VerificationRequestPayload, WorkerSearchQuery},
    error::Result,
    middleware::auth::Claims,
    AppState,
};

#[utoipa::path(
    get,
    path = "/api/profiles/me",
    responses(
        (status = 200, description = "Signed-in profile", body = Json<Profile>),
        (status = 401, description = "Missing or invalid token")
    )
)]
#[axum::debug_handler]
pub async fn get_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let profile = state.profiles.get(claims.profile_id).await?;
    Ok(Json(profile))
}

#[utoipa::path(
    patch,
    path = "/api/profiles/me",
    request_body = UpdateProfilePayload,
    responses(
        (status = 200, description = "Profile updated", body = Json<Profile>),
        (status = 400, description = "Invalid payload")
    )
)]
#[axum::debug_handler]
pub async fn update_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<UpdateProfilePayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let profile = state.profiles.update(claims.profile_id, payload).await?;
    Ok(Json(profile))
}

#[utoipa::path(
    get,
    path = "/api/profiles/{id}",
    params(
        ("id" = Uuid, Path, description = "Profile ID")
    ),
    responses(
        (status = 200, description = "Profile found", body = Json<Profile>),
        (status = 404, description = "Profile not found")
    )
)]
#[axum::debug_handler]
pub async fn get_profile(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let profile = state.profiles.get(id).await?;
    Ok(Json(profile))
}

#[utoipa::path(
    get,
    path = "/api/workers",
    params(
        ("skill" = Option<String>, Query, description = "Required skill"),
        ("search" = Option<String>, Query, description = "Matched against name and bio"),
        ("location" = Option<String>, Query, description = "Address contains"),
        ("limit" = Option<i64>, Query, description = "Maximum rows")
    ),
    responses(
        (status = 200, description = "Matching workers", body = Json<Vec<Profile>>)
    )
)]
#[axum::debug_handler]
pub async fn search_workers(
    State(state): State<AppState>,
    Query(query): Query<WorkerSearchQuery>,
) -> Result<impl IntoResponse> {
    let workers = state.profiles.search_workers(query).await?;
    Ok(Json(workers))
}

#[utoipa::path(
    get,
    path = "/api/profiles/{id}/rating",
    params(
        ("id" = Uuid, Path, description = "Profile ID")
    ),
    responses(
        (status = 200, description = "Average rating and review count", body = Json<RatingSummary>)
    )
)]
#[axum::debug_handler]
pub async fn rating(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let summary = state.reviews.rating_summary(id).await?;
    Ok(Json(summary))
}

#[utoipa::path(
    get,
    path = "/api/profiles/{id}/reviews",
    params(
        ("id" = Uuid, Path, description = "Profile ID")
    ),
    responses(
        (status = 200, description = "Reviews received", body = Json<Vec<ReviewWithContext>>)
    )
)]
#[axum::debug_handler]
pub async fn reviews(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let reviews = state.reviews.list_for(id).await?;
    Ok(Json(reviews))
}

#[utoipa::path(
    post,
    path = "/api/verification-requests",
    request_body = VerificationRequestPayload,
    responses(
        (status = 201, description = "Verification request submitted", body = Json<VerificationRequest>),
        (status = 400, description = "Invalid payload")
    )
)]
#[axum::debug_handler]
pub async fn submit_verification(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<VerificationRequestPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let request = state
        .profiles
        .submit_verification(claims.profile_id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}
