use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::profile::ProfileSummary;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Conversation {
    pub id: Uuid,
    pub participant_1: Uuid,
    pub participant_2: Uuid,
    pub job_id: Option<Uuid>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn involves(&self, profile_id: Uuid) -> bool {
        self.participant_1 == profile_id || self.participant_2 == profile_id
    }

    /// The participant that is not `me`.
    pub fn counterpart(&self, me: Uuid) -> Uuid {
        if self.participant_1 == me {
            self.participant_2
        } else {
            self.participant_1
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub participant_profile: ProfileSummary,
    pub unread_count: i64,
    pub last_message: Option<String>,
}
