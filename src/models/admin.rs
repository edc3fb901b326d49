use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "admin_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AdminRole {
    SuperAdmin,
    Admin,
    Moderator,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AdminProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub admin_role: AdminRole,
    pub permissions: Option<JsonValue>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AdminActivityLog {
    pub id: Uuid,
    pub admin_id: Uuid,
    pub action_type: String,
    pub description: String,
    pub target_type: Option<String>,
    pub target_id: Option<Uuid>,
    pub metadata: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ActivityLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub activity_type: String,
    pub description: String,
    pub metadata: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PlatformAnalytics {
    pub total_users: i64,
    pub total_workers: i64,
    pub total_employers: i64,
    pub active_users: i64,
    pub suspended_users: i64,
    pub banned_users: i64,
    pub pending_approvals: i64,
    pub total_jobs: i64,
    pub open_jobs: i64,
    pub total_applications: i64,
    pub total_payments: i64,
    pub total_revenue: rust_decimal::Decimal,
    pub pending_verifications: i64,
    pub last_updated: DateTime<Utc>,
}
