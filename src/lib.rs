pub mod client;
pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod realtime;
pub mod routes;
pub mod services;
pub mod utils;

use axum::{
    routing::{get, patch, post},
    Router,
};
use sqlx::PgPool;
use tower_http::trace::TraceLayer;

use crate::middleware::{
    auth::require_bearer_auth,
    cors::api_cors,
    rate_limit::{new_rps_state, rps_middleware},
};
use crate::realtime::ChangeBus;
use crate::services::{
    activity_service::ActivityService, admin_service::AdminService,
    application_service::ApplicationService, auth_service::AuthService, job_service::JobService,
    message_service::MessageService, payment_service::PaymentService,
    profile_service::ProfileService, recovery_service::RecoveryService,
    review_service::ReviewService, wallet_service::WalletService,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub bus: ChangeBus,
    pub auth: AuthService,
    pub profiles: ProfileService,
    pub jobs: JobService,
    pub applications: ApplicationService,
    pub wallets: WalletService,
    pub payments: PaymentService,
    pub reviews: ReviewService,
    pub messages: MessageService,
    pub activity: ActivityService,
    pub admin: AdminService,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        let config = crate::config::get_config();
        let bus = ChangeBus::new();

        let recovery = RecoveryService::new(
            pool.clone(),
            config.app_url.clone(),
            config.recovery_webhook_url.clone(),
        );
        let activity = ActivityService::new(pool.clone());
        let jobs = JobService::new(pool.clone(), bus.clone());
        let payments = PaymentService::new(pool.clone(), bus.clone());

        Self {
            auth: AuthService::new(pool.clone(), bus.clone(), recovery.clone()),
            profiles: ProfileService::new(pool.clone(), bus.clone(), activity.clone()),
            applications: ApplicationService::new(
                pool.clone(),
                bus.clone(),
                jobs.clone(),
                activity.clone(),
            ),
            wallets: WalletService::new(pool.clone(), bus.clone()),
            reviews: ReviewService::new(pool.clone()),
            messages: MessageService::new(pool.clone(), bus.clone()),
            admin: AdminService::new(pool.clone(), bus.clone(), recovery, payments.clone()),
            jobs,
            payments,
            activity,
            bus,
            pool,
        }
    }
}

/// The full HTTP surface: public auth routes plus bearer-protected API routes,
/// each behind its own rate limiter.
pub fn app(state: AppState) -> Router {
    let config = crate::config::get_config();

    let public_api = Router::new()
        .route("/api/auth/sign-up", post(routes::auth::sign_up))
        .route("/api/auth/sign-in", post(routes::auth::sign_in))
        .route(
            "/api/auth/password-reset",
            post(routes::auth::request_password_reset),
        )
        .route(
            "/api/auth/password-reset/confirm",
            post(routes::auth::confirm_password_reset),
        )
        .layer(axum::middleware::from_fn_with_state(
            new_rps_state(config.public_rps),
            rps_middleware,
        ));

    let api = Router::new()
        .route(
            "/api/profiles/me",
            get(routes::profiles::get_me).patch(routes::profiles::update_me),
        )
        .route("/api/profiles/:id", get(routes::profiles::get_profile))
        .route("/api/profiles/:id/rating", get(routes::profiles::rating))
        .route("/api/profiles/:id/reviews", get(routes::profiles::reviews))
        .route("/api/workers", get(routes::profiles::search_workers))
        .route(
            "/api/verification-requests",
            post(routes::profiles::submit_verification),
        )
        .route(
            "/api/jobs",
            get(routes::jobs::list_jobs).post(routes::jobs::create_job),
        )
        .route("/api/jobs/mine", get(routes::jobs::my_jobs))
        .route(
            "/api/jobs/:id",
            get(routes::jobs::get_job).patch(routes::jobs::update_job),
        )
        .route(
            "/api/jobs/:id/applications",
            get(routes::jobs::job_applications).post(routes::jobs::apply),
        )
        .route(
            "/api/applications/mine",
            get(routes::applications::my_applications),
        )
        .route(
            "/api/applications/applied-job-ids",
            get(routes::applications::applied_job_ids),
        )
        .route(
            "/api/applications/:id",
            patch(routes::applications::update_status),
        )
        .route("/api/wallet", get(routes::wallet::get_wallet))
        .route("/api/wallet/top-up", post(routes::wallet::top_up))
        .route(
            "/api/payments",
            get(routes::payments::history).post(routes::payments::create_payment),
        )
        .route(
            "/api/payments/existing",
            get(routes::payments::existing_payment),
        )
        .route(
            "/api/payments/:id/confirm",
            post(routes::payments::confirm_receipt),
        )
        .route("/api/reviews", post(routes::reviews::create_review))
        .route(
            "/api/conversations",
            get(routes::messages::list_conversations).post(routes::messages::start_conversation),
        )
        .route(
            "/api/conversations/:id",
            get(routes::messages::get_conversation),
        )
        .route(
            "/api/conversations/:id/messages",
            get(routes::messages::list_messages).post(routes::messages::send_message),
        )
        .route(
            "/api/conversations/:id/read",
            post(routes::messages::mark_read),
        )
        .route(
            "/api/messages/unread-count",
            get(routes::messages::unread_count),
        )
        .route("/api/realtime", get(routes::realtime::stream_changes))
        .route("/api/admin/analytics", get(routes::admin::analytics))
        .route(
            "/api/admin/analytics/refresh",
            post(routes::admin::refresh_analytics),
        )
        .route("/api/admin/users", get(routes::admin::list_users))
        .route(
            "/api/admin/users/:id",
            axum::routing::delete(routes::admin::delete_user),
        )
        .route(
            "/api/admin/users/:id/approval",
            post(routes::admin::update_approval),
        )
        .route(
            "/api/admin/users/:id/status",
            post(routes::admin::set_user_status),
        )
        .route(
            "/api/admin/users/:id/verified",
            post(routes::admin::set_verified),
        )
        .route("/api/admin/admins", post(routes::admin::create_admin))
        .route(
            "/api/admin/payments/:id/status",
            post(routes::admin::set_payment_status),
        )
        .route(
            "/api/admin/verifications",
            get(routes::admin::list_verifications),
        )
        .route(
            "/api/admin/verifications/:id/review",
            post(routes::admin::review_verification),
        )
        .route("/api/admin/activity-logs", get(routes::admin::activity_logs))
        .route(
            "/api/admin/user-activity",
            get(routes::admin::user_activity),
        )
        .route(
            "/api/admin/reset-password",
            post(routes::admin::reset_password),
        )
        .layer(axum::middleware::from_fn(require_bearer_auth))
        .layer(axum::middleware::from_fn_with_state(
            new_rps_state(config.api_rps),
            rps_middleware,
        ));

    Router::new()
        .route("/health", get(routes::health::health))
        .route("/api/openapi.json", get(routes::openapi::openapi_json))
        .merge(public_api)
        .merge(api)
        .with_state(state)
        .layer(api_cors())
        .layer(TraceLayer::new_for_http())
}
