use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::admin_dto::{
        ActivityLogQuery, AdminResetPasswordPayload, CreateAdminPayload,
        ReviewVerificationPayload, SetPaymentStatusPayload, SetVerifiedPayload,
        UpdateApprovalPayload, UpdateUserStatusPayload, UserListQuery, VerificationListQuery,
    },
    error::Result,
    middleware::auth::Claims,
    services::admin_service::RequestOrigin,
    AppState,
};

#[utoipa::path(
    get,
    path = "/api/admin/analytics",
    responses(
        (status = 200, description = "Platform analytics snapshot", body = Json<PlatformAnalytics>),
        (status = 403, description = "Admins only")
    )
)]
#[axum::debug_handler]
pub async fn analytics(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    state.admin.require_admin(claims.sub).await?;
    let analytics = state.admin.analytics().await?;
    Ok(Json(analytics))
}

#[utoipa::path(
    post,
    path = "/api/admin/analytics/refresh",
    responses(
        (status = 200, description = "Recomputed analytics", body = Json<PlatformAnalytics>),
        (status = 403, description = "Admins only")
    )
)]
#[axum::debug_handler]
pub async fn refresh_analytics(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let admin = state.admin.require_admin(claims.sub).await?;
    let analytics = state.admin.refresh_analytics(Some(admin.user_id)).await?;
    Ok(Json(analytics))
}

#[utoipa::path(
    get,
    path = "/api/admin/users",
    params(
        ("status" = Option<String>, Query, description = "User status"),
        ("role" = Option<String>, Query, description = "worker or employer"),
        ("search" = Option<String>, Query, description = "Name contains"),
        ("include_deleted" = Option<bool>, Query, description = "Include soft-deleted users")
    ),
    responses(
        (status = 200, description = "User profiles", body = Json<Vec<Profile>>),
        (status = 403, description = "Admins only")
    )
)]
#[axum::debug_handler]
pub async fn list_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<UserListQuery>,
) -> Result<impl IntoResponse> {
    state.admin.require_admin(claims.sub).await?;
    let users = state.admin.list_users(query).await?;
    Ok(Json(users))
}

#[utoipa::path(
    post,
    path = "/api/admin/users/{id}/approval",
    params(
        ("id" = Uuid, Path, description = "Profile ID")
    ),
    request_body = UpdateApprovalPayload,
    responses(
        (status = 200, description = "Approval recorded", body = Json<Profile>),
        (status = 403, description = "Admins only")
    )
)]
#[axum::debug_handler]
pub async fn update_approval(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateApprovalPayload>,
) -> Result<impl IntoResponse> {
    let admin = state.admin.require_admin(claims.sub).await?;
    let profile = state.admin.update_approval(&admin, id, payload).await?;
    Ok(Json(profile))
}

#[utoipa::path(
    post,
    path = "/api/admin/users/{id}/status",
    params(
        ("id" = Uuid, Path, description = "Profile ID")
    ),
    request_body = UpdateUserStatusPayload,
    responses(
        (status = 200, description = "Status changed", body = Json<Profile>),
        (status = 403, description = "Admins only")
    )
)]
#[axum::debug_handler]
pub async fn set_user_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserStatusPayload>,
) -> Result<impl IntoResponse> {
    let admin = state.admin.require_admin(claims.sub).await?;
    let profile = state.admin.set_user_status(&admin, id, payload).await?;
    Ok(Json(profile))
}

#[utoipa::path(
    post,
    path = "/api/admin/users/{id}/verified",
    params(
        ("id" = Uuid, Path, description = "Profile ID")
    ),
    request_body = SetVerifiedPayload,
    responses(
        (status = 200, description = "Verification flag changed", body = Json<Profile>),
        (status = 403, description = "Admins only")
    )
)]
#[axum::debug_handler]
pub async fn set_verified(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetVerifiedPayload>,
) -> Result<impl IntoResponse> {
    let admin = state.admin.require_admin(claims.sub).await?;
    let profile = state.admin.set_verified(&admin, id, payload).await?;
    Ok(Json(profile))
}

#[utoipa::path(
    delete,
    path = "/api/admin/users/{id}",
    params(
        ("id" = Uuid, Path, description = "Profile ID")
    ),
    responses(
        (status = 204, description = "User soft-deleted"),
        (status = 403, description = "Admins only")
    )
)]
#[axum::debug_handler]
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let admin = state.admin.require_admin(claims.sub).await?;
    state.admin.soft_delete_user(&admin, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/admin/admins",
    request_body = CreateAdminPayload,
    responses(
        (status = 201, description = "Admin created", body = Json<AdminProfile>),
        (status = 403, description = "Super admins only")
    )
)]
#[axum::debug_handler]
pub async fn create_admin(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateAdminPayload>,
) -> Result<impl IntoResponse> {
    let caller = state.admin.require_admin(claims.sub).await?;
    let created = state.admin.create_admin(&caller, payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    post,
    path = "/api/admin/payments/{id}/status",
    params(
        ("id" = Uuid, Path, description = "Payment ID")
    ),
    request_body = SetPaymentStatusPayload,
    responses(
        (status = 200, description = "Payment status changed", body = Json<Payment>),
        (status = 403, description = "Admins only")
    )
)]
#[axum::debug_handler]
pub async fn set_payment_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetPaymentStatusPayload>,
) -> Result<impl IntoResponse> {
    let admin = state.admin.require_admin(claims.sub).await?;
    let payment = state.admin.set_payment_status(&admin, id, payload).await?;
    Ok(Json(payment))
}

#[utoipa::path(
    get,
    path = "/api/admin/verifications",
    params(
        ("status" = Option<String>, Query, description = "Request status")
    ),
    responses(
        (status = 200, description = "Verification queue", body = Json<Vec<VerificationQueueItem>>),
        (status = 403, description = "Admins only")
    )
)]
#[axum::debug_handler]
pub async fn list_verifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<VerificationListQuery>,
) -> Result<impl IntoResponse> {
    state.admin.require_admin(claims.sub).await?;
    let queue = state.admin.list_verifications(query).await?;
    Ok(Json(queue))
}

#[utoipa::path(
    post,
    path = "/api/admin/verifications/{id}/review",
    params(
        ("id" = Uuid, Path, description = "Verification request ID")
    ),
    request_body = ReviewVerificationPayload,
    responses(
        (status = 200, description = "Request reviewed", body = Json<VerificationRequest>),
        (status = 403, description = "Admins only")
    )
)]
#[axum::debug_handler]
pub async fn review_verification(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReviewVerificationPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let admin = state.admin.require_admin(claims.sub).await?;
    let request = state.admin.review_verification(&admin, id, payload).await?;
    Ok(Json(request))
}

#[utoipa::path(
    get,
    path = "/api/admin/activity-logs",
    params(
        ("limit" = Option<i64>, Query, description = "Maximum rows")
    ),
    responses(
        (status = 200, description = "Admin activity log", body = Json<Vec<AdminActivityLog>>),
        (status = 403, description = "Admins only")
    )
)]
#[axum::debug_handler]
pub async fn activity_logs(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ActivityLogQuery>,
) -> Result<impl IntoResponse> {
    state.admin.require_admin(claims.sub).await?;
    let logs = state.activity.list_admin(query.limit).await?;
    Ok(Json(logs))
}

#[utoipa::path(
    get,
    path = "/api/admin/user-activity",
    params(
        ("limit" = Option<i64>, Query, description = "Maximum rows")
    ),
    responses(
        (status = 200, description = "User activity log", body = Json<Vec<ActivityLog>>),
        (status = 403, description = "Admins only")
    )
)]
#[axum::debug_handler]
pub async fn user_activity(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ActivityLogQuery>,
) -> Result<impl IntoResponse> {
    state.admin.require_admin(claims.sub).await?;
    let logs = state.activity.list(query.limit).await?;
    Ok(Json(logs))
}

fn request_origin(headers: &HeaderMap) -> RequestOrigin {
    let text = |value: Option<&header::HeaderValue>| {
        value
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    RequestOrigin {
        ip_address: text(headers.get("x-forwarded-for"))
            .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string())),
        user_agent: text(headers.get(header::USER_AGENT)),
    }
}

#[utoipa::path(
    post,
    path = "/api/admin/reset-password",
    request_body = AdminResetPasswordPayload,
    responses(
        (status = 200, description = "Password reset", body = Json<AdminResetPasswordResponse>),
        (status = 403, description = "Super admins only")
    )
)]
#[axum::debug_handler]
pub async fn reset_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Json(payload): Json<AdminResetPasswordPayload>,
) -> Result<impl IntoResponse> {
    let response = state
        .admin
        .reset_password(claims.sub, payload, request_origin(&headers))
        .await?;
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn origin_takes_first_forwarded_address() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.7, 172.16.0.1"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static("dashboard/1.0"));
        let origin = request_origin(&headers);
        assert_eq!(origin.ip_address.as_deref(), Some("10.0.0.7"));
        assert_eq!(origin.user_agent.as_deref(), Some("dashboard/1.0"));

        let origin = request_origin(&HeaderMap::new());
        assert!(origin.ip_address.is_none());
        assert!(origin.user_agent.is_none());
    }
}
