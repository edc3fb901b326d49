use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::admin::AdminRole;
use crate::models::payment::PaymentStatus;
use crate::models::profile::{UserRole, UserStatus};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserListQuery {
    pub status: Option<UserStatus>,
    pub role: Option<UserRole>,
    pub search: Option<String>,
    pub include_deleted: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}

impl ApprovalDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalDecision::Approved => "approved",
            ApprovalDecision::Rejected => "rejected",
        }
    }
}

/// `update_user_approval`: the admin's verdict on a pending registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateApprovalPayload {
    pub status: ApprovalDecision,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateUserStatusPayload {
    pub user_status: UserStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetVerifiedPayload {
    pub is_verified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAdminPayload {
    /// Credential id of the account being promoted.
    pub user_id: Uuid,
    pub admin_role: AdminRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetPaymentStatusPayload {
    pub payment_status: PaymentStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReviewVerificationPayload {
    pub approved: bool,
    #[validate(length(max = 2000))]
    pub comments: Option<String>,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityLogQuery {
    pub limit: Option<i64>,
}

/// Body of the super-admin password reset call; field names match the
/// dashboard's camelCase payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminResetPasswordPayload {
    pub target_user_id: Uuid,
    pub reset_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminResetPasswordResponse {
    pub success: bool,
    pub message: String,
}
