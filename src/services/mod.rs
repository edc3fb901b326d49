pub mod activity_service;
pub mod admin_service;
pub mod application_service;
pub mod auth_service;
pub mod job_service;
pub mod message_service;
pub mod payment_service;
pub mod profile_service;
pub mod recovery_service;
pub mod review_service;
pub mod wallet_service;
