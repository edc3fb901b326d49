use crate::error::Result;
use crate::models::admin::{ActivityLog, AdminActivityLog};
use serde_json::Value as JsonValue;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

const DEFAULT_LIMIT: i64 = 100;

#[derive(Clone)]
pub struct ActivityService {
    pool: PgPool,
}

impl ActivityService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// `log_activity`: a user-facing action such as applying for a job.
    pub async fn log(
        &self,
        user_id: Uuid,
        activity_type: &str,
        description: &str,
        metadata: Option<JsonValue>,
    ) -> Result<ActivityLog> {
        let row = sqlx::query_as::<_, ActivityLog>(
            r#"
            INSERT INTO activity_logs (user_id, activity_type, description, metadata)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(activity_type)
        .bind(description)
        .bind(metadata)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list(&self, limit: Option<i64>) -> Result<Vec<ActivityLog>> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, 500);
        let rows = sqlx::query_as::<_, ActivityLog>(
            "SELECT * FROM activity_logs ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn list_admin(&self, limit: Option<i64>) -> Result<Vec<AdminActivityLog>> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, 500);
        let rows = sqlx::query_as::<_, AdminActivityLog>(
            "SELECT * FROM admin_activity_logs ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

/// An admin action row for `log_admin_activity`, written inside the caller's transaction.
pub struct AdminAction<'a> {
    pub admin_id: Uuid,
    pub action_type: &'a str,
    pub description: String,
    pub target_type: Option<&'a str>,
    pub target_id: Option<Uuid>,
    pub metadata: Option<JsonValue>,
}

pub async fn log_admin_activity(conn: &mut PgConnection, action: AdminAction<'_>) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO admin_activity_logs (admin_id, action_type, description, target_type, target_id, metadata)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(action.admin_id)
    .bind(action.action_type)
    .bind(&action.description)
    .bind(action.target_type)
    .bind(action.target_id)
    .bind(action.metadata)
    .execute(conn)
    .await?;
    Ok(())
}
