pub mod admin_dto;
pub mod auth_dto;
pub mod job_dto;
pub mod message_dto;
pub mod payment_dto;
pub mod profile_dto;
pub mod review_dto;
