use axum::Json;
use utoipa::OpenApi;

use crate::routes;

#[derive(OpenApi)]
#[openapi(
    info(title = "Marketplace API"),
    paths(
        routes::health::health,
        routes::auth::sign_up,
        routes::auth::sign_in,
        routes::auth::request_password_reset,
        routes::auth::confirm_password_reset,
        routes::profiles::get_me,
        routes::profiles::update_me,
        routes::profiles::get_profile,
        routes::profiles::search_workers,
        routes::profiles::rating,
        routes::profiles::reviews,
        routes::profiles::submit_verification,
        routes::jobs::create_job,
        routes::jobs::update_job,
        routes::jobs::list_jobs,
        routes::jobs::my_jobs,
        routes::jobs::get_job,
        routes::jobs::apply,
        routes::jobs::job_applications,
        routes::applications::my_applications,
        routes::applications::applied_job_ids,
        routes::applications::update_status,
        routes::wallet::get_wallet,
        routes::wallet::top_up,
        routes::payments::create_payment,
        routes::payments::existing_payment,
        routes::payments::history,
        routes::payments::confirm_receipt,
        routes::reviews::create_review,
        routes::messages::start_conversation,
        routes::messages::list_conversations,
        routes::messages::get_conversation,
        routes::messages::list_messages,
        routes::messages::send_message,
        routes::messages::mark_read,
        routes::messages::unread_count,
        routes::realtime::stream_changes,
        routes::admin::analytics,
        routes::admin::refresh_analytics,
        routes::admin::list_users,
        routes::admin::update_approval,
        routes::admin::set_user_status,
        routes::admin::set_verified,
        routes::admin::delete_user,
        routes::admin::create_admin,
        routes::admin::set_payment_status,
        routes::admin::list_verifications,
        routes::admin::review_verification,
        routes::admin::activity_logs,
        routes::admin::user_activity,
        routes::admin::reset_password,
    )
)]
pub struct ApiDoc;

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_is_documented() {
        let doc = ApiDoc::openapi();
        assert_eq!(doc.paths.paths.len(), 44);
        for path in [
            "/api/payments",
            "/api/wallet/top-up",
            "/api/conversations/{id}/messages",
            "/api/realtime",
            "/api/admin/users/{id}",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{} missing", path);
        }
        let payments = &doc.paths.paths["/api/payments"];
        assert_eq!(payments.operations.len(), 2);
    }
}
