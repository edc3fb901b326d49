use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const APPLICATION_STATUSES: [&str; 3] = ["pending", "accepted", "rejected"];

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Application {
    pub id: Uuid,
    pub job_id: Uuid,
    pub worker_id: Uuid,
    pub status: String,
    pub cover_letter: Option<String>,
    pub applied_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An application as the job owner sees it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ApplicationWithWorker {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub application: Application,
    pub worker_name: String,
    pub worker_phone: Option<String>,
    pub worker_skills: Option<Vec<String>>,
    pub worker_photo_url: Option<String>,
    pub worker_is_verified: bool,
}

/// An application as the worker sees it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ApplicationWithJob {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub application: Application,
    pub job_title: String,
    pub job_location: String,
    pub job_pay_rate: String,
    pub employer_id: Uuid,
    pub employer_name: String,
}
