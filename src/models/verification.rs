use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::profile::UserRole;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VerificationRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub verification_type: String,
    pub document_urls: Option<Vec<String>>,
    pub status: String,
    pub reviewer_comments: Option<String>,
    pub rejection_reason: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub submitted_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A request in the admin review queue, with the requester's name.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VerificationQueueItem {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub request: VerificationRequest,
    pub full_name: String,
    pub role: UserRole,
}
