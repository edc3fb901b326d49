pub mod admin;
pub mod application;
pub mod conversation;
pub mod job;
pub mod message;
pub mod payment;
pub mod profile;
pub mod review;
pub mod verification;
pub mod wallet;
