pub mod admin;
pub mod applications;
pub mod auth;
pub mod health;
pub mod jobs;
pub mod messages;
pub mod openapi;
pub mod payments;
pub mod profiles;
pub mod realtime;
pub mod reviews;
pub mod wallet;
