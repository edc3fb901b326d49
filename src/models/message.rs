use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub message_text: Option<String>,
    pub attachment_url: Option<String>,
    pub attachment_type: Option<String>,
    pub job_id: Option<Uuid>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
