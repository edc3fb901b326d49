use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::job_dto::UpdateApplicationStatusPayload, error::Result, middleware::auth::Claims,
    AppState,
};

#[utoipa::path(
    get,
    path = "/api/applications/mine",
    responses(
        (status = 200, description = "The worker's applications", body = Json<Vec<ApplicationWithJob>>)
    )
)]
#[axum::debug_handler]
pub async fn my_applications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let applications = state.applications.list_for_worker(claims.profile_id).await?;
    Ok(Json(applications))
}

#[utoipa::path(
    get,
    path = "/api/applications/applied-job-ids",
    responses(
        (status = 200, description = "IDs of jobs applied to", body = Json<Vec<Uuid>>)
    )
)]
#[axum::debug_handler]
pub async fn applied_job_ids(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let ids = state.applications.applied_job_ids(claims.profile_id).await?;
    Ok(Json(ids))
}

#[utoipa::path(
    patch,
    path = "/api/applications/{id}",
    params(
        ("id" = Uuid, Path, description = "Application ID")
    ),
    request_body = UpdateApplicationStatusPayload,
    responses(
        (status = 200, description = "Application status changed", body = Json<Application>),
        (status = 403, description = "Not the job owner"),
        (status = 404, description = "Application not found")
    )
)]
#[axum::debug_handler]
pub async fn update_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateApplicationStatusPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let application = state
        .applications
        .update_status(claims.profile_id, id, payload)
        .await?;
    Ok(Json(application))
}
