use crate::dto::message_dto::SendMessagePayload;
use crate::error::{Error, Result};
use crate::models::conversation::{Conversation, ConversationSummary};
use crate::models::message::Message;
use crate::models::profile::ProfileSummary;
use crate::realtime::{ChangeBus, ChangeKind, Table};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// What to do with the conversations already linking two people so that
/// they end up with exactly one, not bound to any job.
#[derive(Debug, Clone, PartialEq)]
pub enum UnifyPlan {
    Reuse(Conversation),
    /// Take over a job-bound conversation and clear its job.
    Adopt(Conversation),
    Create,
}

pub fn plan_unified_conversation(existing: &[Conversation]) -> UnifyPlan {
    if let Some(general) = existing.iter().find(|c| c.job_id.is_none()) {
        return UnifyPlan::Reuse(general.clone());
    }
    match existing.iter().min_by_key(|c| c.created_at) {
        Some(oldest) => UnifyPlan::Adopt(oldest.clone()),
        None => UnifyPlan::Create,
    }
}

#[derive(Debug, FromRow)]
struct ConversationRow {
    #[sqlx(flatten)]
    conversation: Conversation,
    participant_id: Uuid,
    participant_name: String,
    participant_photo_url: Option<String>,
    participant_company_name: Option<String>,
    unread_count: i64,
    last_message: Option<String>,
}

impl From<ConversationRow> for ConversationSummary {
    fn from(row: ConversationRow) -> Self {
        Self {
            conversation: row.conversation,
            participant_profile: ProfileSummary {
                id: row.participant_id,
                full_name: row.participant_name,
                profile_photo_url: row.participant_photo_url,
                company_name: row.participant_company_name,
            },
            unread_count: row.unread_count,
            last_message: row.last_message,
        }
    }
}

#[derive(Clone)]
pub struct MessageService {
    pool: PgPool,
    bus: ChangeBus,
}

impl MessageService {
    pub fn new(pool: PgPool, bus: ChangeBus) -> Self {
        Self { pool, bus }
    }

    /// Returns the single general conversation between `me` and `other`,
    /// creating or adopting one as needed.
    pub async fn start_conversation(&self, me: Uuid, other: Uuid) -> Result<Conversation> {
        if me == other {
            return Err(Error::BadRequest(
                "You cannot start a conversation with yourself.".into(),
            ));
        }
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM profiles WHERE id = $1 AND deleted_at IS NULL)",
        )
        .bind(other)
        .fetch_one(&self.pool)
        .await?;
        if !exists {
            return Err(Error::NotFound("Profile not found".into()));
        }

        let (low, high) = if me < other { (me, other) } else { (other, me) };
        let mut tx = self.pool.begin().await?;
        // Serializes first contact for the pair until commit.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(format!("conversation:{}:{}", low, high))
            .execute(&mut *tx)
            .await?;

        let existing = sqlx::query_as::<_, Conversation>(
            r#"
            SELECT * FROM conversations
            WHERE (participant_1 = $1 AND participant_2 = $2)
               OR (participant_1 = $2 AND participant_2 = $1)
            ORDER BY created_at
            "#,
        )
        .bind(me)
        .bind(other)
        .fetch_all(&mut *tx)
        .await?;

        match plan_unified_conversation(&existing) {
            UnifyPlan::Reuse(conversation) => {
                tx.commit().await?;
                Ok(conversation)
            }
            UnifyPlan::Adopt(old) => {
                let adopted = sqlx::query_as::<_, Conversation>(
                    "UPDATE conversations SET job_id = NULL, updated_at = NOW() WHERE id = $1 RETURNING *",
                )
                .bind(old.id)
                .fetch_one(&mut *tx)
                .await?;
                tx.commit().await?;
                tracing::info!(conversation_id = %adopted.id, "conversation unified");
                self.bus.publish_update(Table::Conversations, &old, &adopted);
                Ok(adopted)
            }
            UnifyPlan::Create => {
                let created = sqlx::query_as::<_, Conversation>(
                    r#"
                    INSERT INTO conversations (participant_1, participant_2, job_id)
                    VALUES ($1, $2, NULL)
                    RETURNING *
                    "#,
                )
                .bind(me)
                .bind(other)
                .fetch_one(&mut *tx)
                .await?;
                tx.commit().await?;
                tracing::info!(conversation_id = %created.id, "conversation created");
                self.bus
                    .publish(Table::Conversations, ChangeKind::Insert, &created);
                Ok(created)
            }
        }
    }

    /// The caller's conversations, most recently active first. Rows whose
    /// counterpart profile no longer exists are left out.
    pub async fn list_conversations(&self, me: Uuid) -> Result<Vec<ConversationSummary>> {
        let rows = sqlx::query_as::<_, ConversationRow>(
            r#"
            SELECT c.*,
                   p.id AS participant_id,
                   p.full_name AS participant_name,
                   p.profile_photo_url AS participant_photo_url,
                   p.company_name AS participant_company_name,
                   (SELECT COUNT(*) FROM messages m
                     WHERE m.conversation_id = c.id AND m.receiver_id = $1 AND m.is_read = FALSE
                   ) AS unread_count,
                   (SELECT m.message_text FROM messages m
                     WHERE m.conversation_id = c.id
                     ORDER BY m.created_at DESC LIMIT 1
                   ) AS last_message
            FROM conversations c
            JOIN profiles p
              ON p.id = CASE WHEN c.participant_1 = $1 THEN c.participant_2 ELSE c.participant_1 END
            WHERE c.participant_1 = $1 OR c.participant_2 = $1
            ORDER BY c.last_message_at DESC NULLS LAST
            "#,
        )
        .bind(me)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ConversationSummary::from).collect())
    }

    pub async fn get_conversation(&self, me: Uuid, conversation_id: Uuid) -> Result<Conversation> {
        let conversation =
            sqlx::query_as::<_, Conversation>("SELECT * FROM conversations WHERE id = $1")
                .bind(conversation_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| Error::NotFound("Conversation not found".into()))?;
        if !conversation.involves(me) {
            return Err(Error::Forbidden(
                "You are not a participant in this conversation".into(),
            ));
        }
        Ok(conversation)
    }

    pub async fn messages(&self, me: Uuid, conversation_id: Uuid) -> Result<Vec<Message>> {
        self.get_conversation(me, conversation_id).await?;
        let messages = sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE conversation_id = $1 ORDER BY created_at ASC",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(messages)
    }

    pub async fn send(
        &self,
        me: Uuid,
        conversation_id: Uuid,
        payload: SendMessagePayload,
    ) -> Result<Message> {
        let text = payload.message_text.trim();
        if text.is_empty() {
            return Err(Error::BadRequest("Message cannot be empty".into()));
        }
        let conversation = self.get_conversation(me, conversation_id).await?;
        let receiver = conversation.counterpart(me);

        let mut tx = self.pool.begin().await?;
        let message = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (conversation_id, sender_id, receiver_id, message_text, job_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(conversation_id)
        .bind(me)
        .bind(receiver)
        .bind(text)
        .bind(payload.job_id)
        .fetch_one(&mut *tx)
        .await?;
        let bumped = sqlx::query_as::<_, Conversation>(
            r#"
            UPDATE conversations SET last_message_at = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(conversation_id)
        .bind(message.created_at)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::debug!(message_id = %message.id, conversation_id = %conversation_id, "message sent");
        self.bus.publish(Table::Messages, ChangeKind::Insert, &message);
        self.bus
            .publish_update(Table::Conversations, &conversation, &bumped);
        Ok(message)
    }

    /// Marks everything addressed to `me` in the conversation as read.
    pub async fn mark_read(&self, me: Uuid, conversation_id: Uuid) -> Result<u64> {
        self.get_conversation(me, conversation_id).await?;
        let updated = sqlx::query_as::<_, Message>(
            r#"
            UPDATE messages SET is_read = TRUE
            WHERE conversation_id = $1 AND receiver_id = $2 AND is_read = FALSE
            RETURNING *
            "#,
        )
        .bind(conversation_id)
        .bind(me)
        .fetch_all(&self.pool)
        .await?;

        for message in &updated {
            let before = Message {
                is_read: false,
                ..message.clone()
            };
            self.bus.publish_update(Table::Messages, &before, message);
        }
        Ok(updated.len() as u64)
    }

    pub async fn unread_count(&self, me: Uuid) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM messages WHERE receiver_id = $1 AND is_read = FALSE",
        )
        .bind(me)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn conversation(job_id: Option<Uuid>, age_days: i64) -> Conversation {
        let created = Utc::now() - Duration::days(age_days);
        Conversation {
            id: Uuid::new_v4(),
            participant_1: Uuid::new_v4(),
            participant_2: Uuid::new_v4(),
            job_id,
            last_message_at: None,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn general_conversation_is_reused() {
        let job_bound = conversation(Some(Uuid::new_v4()), 5);
        let general = conversation(None, 1);
        let plan = plan_unified_conversation(&[job_bound, general.clone()]);
        assert_eq!(plan, UnifyPlan::Reuse(general));
    }

    #[test]
    fn oldest_job_conversation_is_adopted() {
        let newer = conversation(Some(Uuid::new_v4()), 1);
        let older = conversation(Some(Uuid::new_v4()), 9);
        let plan = plan_unified_conversation(&[newer, older.clone()]);
        assert_eq!(plan, UnifyPlan::Adopt(older));
    }

    #[test]
    fn nothing_existing_means_create() {
        assert_eq!(plan_unified_conversation(&[]), UnifyPlan::Create);
    }
}
