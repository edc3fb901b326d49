use crate::dto::admin_dto::{
    AdminResetPasswordPayload, AdminResetPasswordResponse, ApprovalDecision, CreateAdminPayload,
    ReviewVerificationPayload, SetPaymentStatusPayload, SetVerifiedPayload, UpdateApprovalPayload,
    UpdateUserStatusPayload, UserListQuery, VerificationListQuery,
};
use crate::error::{Error, Result};
use crate::models::admin::{AdminProfile, AdminRole, PlatformAnalytics};
use crate::models::payment::Payment;
use crate::models::profile::Profile;
use crate::models::verification::{VerificationQueueItem, VerificationRequest};
use crate::realtime::{ChangeBus, Table};
use crate::services::activity_service::{log_admin_activity, AdminAction};
use crate::services::payment_service::PaymentService;
use crate::services::recovery_service::RecoveryService;
use serde_json::json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

pub const ANALYTICS_SETTING: &str = "analytics_snapshot";
pub const SUPER_ADMIN_REQUIRED: &str = "Insufficient privileges - super admin required";
const DEFAULT_RESET_REASON: &str = "Password reset by Super Admin";

const ANALYTICS_QUERY: &str = r#"
    SELECT
        (SELECT COUNT(*) FROM profiles WHERE deleted_at IS NULL) AS total_users,
        (SELECT COUNT(*) FROM profiles WHERE deleted_at IS NULL AND role = 'worker') AS total_workers,
        (SELECT COUNT(*) FROM profiles WHERE deleted_at IS NULL AND role = 'employer') AS total_employers,
        (SELECT COUNT(*) FROM profiles WHERE deleted_at IS NULL AND user_status = 'active') AS active_users,
        (SELECT COUNT(*) FROM profiles WHERE deleted_at IS NULL AND user_status = 'suspended') AS suspended_users,
        (SELECT COUNT(*) FROM profiles WHERE deleted_at IS NULL AND user_status = 'banned') AS banned_users,
        (SELECT COUNT(*) FROM profiles WHERE deleted_at IS NULL AND approval_status = 'pending') AS pending_approvals,
        (SELECT COUNT(*) FROM jobs) AS total_jobs,
        (SELECT COUNT(*) FROM jobs WHERE status = 'open') AS open_jobs,
        (SELECT COUNT(*) FROM applications) AS total_applications,
        (SELECT COUNT(*) FROM payments) AS total_payments,
        (SELECT COALESCE(SUM(amount), 0) FROM payments
          WHERE payment_status = 'completed' AND payer_id <> payee_id) AS total_revenue,
        (SELECT COUNT(*) FROM verification_requests WHERE status = 'pending') AS pending_verifications,
        NOW() AS last_updated
"#;

/// Where an admin request came from, recorded with password resets.
#[derive(Debug, Clone, Default)]
pub struct RequestOrigin {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Clone)]
pub struct AdminService {
    pool: PgPool,
    bus: ChangeBus,
    recovery: RecoveryService,
    payments: PaymentService,
}

impl AdminService {
    pub fn new(
        pool: PgPool,
        bus: ChangeBus,
        recovery: RecoveryService,
        payments: PaymentService,
    ) -> Self {
        Self {
            pool,
            bus,
            recovery,
            payments,
        }
    }

    async fn admin_profile(&self, user_id: Uuid) -> Result<Option<AdminProfile>> {
        let admin = sqlx::query_as::<_, AdminProfile>("SELECT * FROM admin_profiles WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(admin)
    }

    /// The caller's admin profile, or 403 when they have none.
    pub async fn require_admin(&self, user_id: Uuid) -> Result<AdminProfile> {
        self.admin_profile(user_id)
            .await?
            .ok_or_else(|| Error::Forbidden("Admin access required".into()))
    }

    pub async fn require_super_admin(&self, user_id: Uuid) -> Result<AdminProfile> {
        match self.admin_profile(user_id).await? {
            Some(admin) if admin.admin_role == AdminRole::SuperAdmin => Ok(admin),
            _ => Err(Error::Forbidden(SUPER_ADMIN_REQUIRED.into())),
        }
    }

    async fn compute_analytics(&self) -> Result<PlatformAnalytics> {
        let analytics = sqlx::query_as::<_, PlatformAnalytics>(ANALYTICS_QUERY)
            .fetch_one(&self.pool)
            .await?;
        Ok(analytics)
    }

    /// The stored snapshot, computed and stored on first use.
    pub async fn analytics(&self) -> Result<PlatformAnalytics> {
        let stored: Option<serde_json::Value> =
            sqlx::query_scalar("SELECT setting_value FROM platform_settings WHERE setting_key = $1")
                .bind(ANALYTICS_SETTING)
                .fetch_optional(&self.pool)
                .await?;
        match stored.map(serde_json::from_value::<PlatformAnalytics>) {
            Some(Ok(snapshot)) => Ok(snapshot),
            Some(Err(e)) => {
                tracing::warn!(error = %e, "stored analytics snapshot unreadable, recomputing");
                self.refresh_analytics(None).await
            }
            None => self.refresh_analytics(None).await,
        }
    }

    /// `refresh_platform_analytics`: recompute and overwrite the snapshot.
    pub async fn refresh_analytics(&self, updated_by: Option<Uuid>) -> Result<PlatformAnalytics> {
        let analytics = self.compute_analytics().await?;
        sqlx::query(
            r#"
            INSERT INTO platform_settings (setting_key, setting_value, description, updated_by)
            VALUES ($1, $2, 'Cached platform analytics', $3)
            ON CONFLICT (setting_key) DO UPDATE
            SET setting_value = EXCLUDED.setting_value,
                updated_by = EXCLUDED.updated_by,
                updated_at = NOW()
            "#,
        )
        .bind(ANALYTICS_SETTING)
        .bind(serde_json::to_value(&analytics)?)
        .bind(updated_by)
        .execute(&self.pool)
        .await?;
        tracing::debug!("analytics snapshot refreshed");
        Ok(analytics)
    }

    pub async fn list_users(&self, query: UserListQuery) -> Result<Vec<Profile>> {
        let mut filters: Vec<String> = Vec::new();
        let mut args: Vec<String> = Vec::new();

        if !query.include_deleted.unwrap_or(false) {
            filters.push("deleted_at IS NULL".into());
        }
        if let Some(status) = query.status {
            args.push(status.as_str().into());
            filters.push(format!("user_status = ${}::user_status", args.len()));
        }
        if let Some(role) = query.role {
            args.push(role.as_str().into());
            filters.push(format!("role = ${}::user_role", args.len()));
        }
        if let Some(search) = query.search.filter(|s| !s.trim().is_empty()) {
            args.push(format!("%{}%", search.trim()));
            filters.push(format!(
                "(full_name ILIKE ${0} OR company_name ILIKE ${0} OR phone ILIKE ${0})",
                args.len()
            ));
        }

        let where_clause = if filters.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", filters.join(" AND "))
        };
        let sql = format!("SELECT * FROM profiles {} ORDER BY created_at DESC", where_clause);
        let mut statement = sqlx::query_as::<_, Profile>(&sql);
        for value in &args {
            statement = statement.bind(value);
        }
        Ok(statement.fetch_all(&self.pool).await?)
    }

    async fn profile_for_update(conn: &mut PgConnection, profile_id: Uuid) -> Result<Profile> {
        sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE id = $1 FOR UPDATE")
            .bind(profile_id)
            .fetch_optional(conn)
            .await?
            .ok_or_else(|| Error::NotFound("User not found".into()))
    }

    /// Runs `sql` (`$1` = profile id, `$2` = `value`) against a locked
    /// profile, logs the admin action in the same transaction, and publishes
    /// the change.
    async fn change_profile(
        &self,
        admin: &AdminProfile,
        profile_id: Uuid,
        sql: &str,
        value: String,
        action: (&str, String),
        metadata: Option<serde_json::Value>,
    ) -> Result<Profile> {
        let (action_type, description) = action;
        let mut tx = self.pool.begin().await?;
        let before = Self::profile_for_update(&mut tx, profile_id).await?;
        let after = sqlx::query_as::<_, Profile>(sql)
            .bind(profile_id)
            .bind(value)
            .fetch_one(&mut *tx)
            .await?;
        log_admin_activity(
            &mut tx,
            AdminAction {
                admin_id: admin.user_id,
                action_type,
                description,
                target_type: Some("profile"),
                target_id: Some(profile_id),
                metadata,
            },
        )
        .await?;
        tx.commit().await?;

        tracing::info!(profile_id = %profile_id, action = action_type, "admin updated profile");
        self.bus.publish_update(Table::Profiles, &before, &after);
        Ok(after)
    }

    /// `update_user_approval`
    pub async fn update_approval(
        &self,
        admin: &AdminProfile,
        profile_id: Uuid,
        payload: UpdateApprovalPayload,
    ) -> Result<Profile> {
        let decision = payload.status;
        let reason = payload.reason.filter(|r| !r.trim().is_empty());
        let sql = match decision {
            ApprovalDecision::Approved => {
                r#"
                UPDATE profiles SET approval_status = 'approved', approved_at = NOW(),
                    approved_by = $2, rejection_reason = NULL, updated_at = NOW()
                WHERE id = $1 RETURNING *
                "#
            }
            ApprovalDecision::Rejected => {
                r#"
                UPDATE profiles SET approval_status = 'rejected', approved_at = NULL,
                    approved_by = $2, rejection_reason = $3, updated_at = NOW()
                WHERE id = $1 RETURNING *
                "#
            }
        };

        let mut tx = self.pool.begin().await?;
        let before = Self::profile_for_update(&mut tx, profile_id).await?;
        let mut statement = sqlx::query_as::<_, Profile>(sql)
            .bind(profile_id)
            .bind(admin.user_id);
        if decision == ApprovalDecision::Rejected {
            statement = statement.bind(reason.clone());
        }
        let after = statement.fetch_one(&mut *tx).await?;
        log_admin_activity(
            &mut tx,
            AdminAction {
                admin_id: admin.user_id,
                action_type: "user_approval",
                description: format!("User {}", decision.as_str()),
                target_type: Some("profile"),
                target_id: Some(profile_id),
                metadata: Some(json!({ "status": decision.as_str(), "reason": reason })),
            },
        )
        .await?;
        tx.commit().await?;

        tracing::info!(profile_id = %profile_id, decision = decision.as_str(), "approval updated");
        self.bus.publish_update(Table::Profiles, &before, &after);
        Ok(after)
    }

    pub async fn set_user_status(
        &self,
        admin: &AdminProfile,
        profile_id: Uuid,
        payload: UpdateUserStatusPayload,
    ) -> Result<Profile> {
        let status = payload.user_status.as_str();
        self.change_profile(
            admin,
            profile_id,
            "UPDATE profiles SET user_status = $2::user_status, updated_at = NOW() WHERE id = $1 RETURNING *",
            status.to_string(),
            ("user_status_change", format!("Changed user status to {}", status)),
            Some(json!({ "user_status": status })),
        )
        .await
    }

    pub async fn set_verified(
        &self,
        admin: &AdminProfile,
        profile_id: Uuid,
        payload: SetVerifiedPayload,
    ) -> Result<Profile> {
        let verb = if payload.is_verified { "Verified" } else { "Unverified" };
        self.change_profile(
            admin,
            profile_id,
            "UPDATE profiles SET is_verified = $2::boolean, updated_at = NOW() WHERE id = $1 RETURNING *",
            payload.is_verified.to_string(),
            ("user_verification", format!("{} user profile", verb)),
            None,
        )
        .await
    }

    /// `soft_delete_user`: the row stays, flagged with who deleted it and when.
    pub async fn soft_delete_user(&self, admin: &AdminProfile, profile_id: Uuid) -> Result<Profile> {
        self.change_profile(
            admin,
            profile_id,
            "UPDATE profiles SET deleted_at = NOW(), deleted_by = $2::uuid, updated_at = NOW() WHERE id = $1 RETURNING *",
            admin.user_id.to_string(),
            ("user_deletion", "Soft deleted user".to_string()),
            None,
        )
        .await
    }

    pub async fn create_admin(
        &self,
        caller: &AdminProfile,
        payload: CreateAdminPayload,
    ) -> Result<AdminProfile> {
        if caller.admin_role != AdminRole::SuperAdmin {
            return Err(Error::Forbidden(SUPER_ADMIN_REQUIRED.into()));
        }
        let mut tx = self.pool.begin().await?;
        let created = sqlx::query_as::<_, AdminProfile>(
            r#"
            INSERT INTO admin_profiles (user_id, admin_role, created_by)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(payload.user_id)
        .bind(payload.admin_role)
        .bind(caller.user_id)
        .fetch_one(&mut *tx)
        .await?;
        log_admin_activity(
            &mut tx,
            AdminAction {
                admin_id: caller.user_id,
                action_type: "admin_creation",
                description: format!("Created {:?} admin profile", payload.admin_role),
                target_type: Some("admin_profile"),
                target_id: Some(payload.user_id),
                metadata: None,
            },
        )
        .await?;
        tx.commit().await?;
        Ok(created)
    }

    /// The only route to `failed` or `cancelled`; see `PaymentService::set_status`.
    pub async fn set_payment_status(
        &self,
        admin: &AdminProfile,
        payment_id: Uuid,
        payload: SetPaymentStatusPayload,
    ) -> Result<Payment> {
        let status = payload.payment_status;
        let payment = self.payments.set_status(payment_id, status).await?;
        let mut conn = self.pool.acquire().await?;
        log_admin_activity(
            &mut conn,
            AdminAction {
                admin_id: admin.user_id,
                action_type: "payment_status_change",
                description: format!("Set payment status to {}", status.as_str()),
                target_type: Some("payment"),
                target_id: Some(payment_id),
                metadata: Some(json!({ "amount": payment.amount })),
            },
        )
        .await?;
        Ok(payment)
    }

    pub async fn list_verifications(
        &self,
        query: VerificationListQuery,
    ) -> Result<Vec<VerificationQueueItem>> {
        let status = query.status.filter(|s| s != "all");
        let rows = sqlx::query_as::<_, VerificationQueueItem>(
            r#"
            SELECT v.*, p.full_name, p.role
            FROM verification_requests v
            JOIN profiles p ON p.id = v.user_id
            WHERE ($1::text IS NULL OR v.status = $1)
            ORDER BY v.submitted_at DESC
            "#,
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Approving a request marks the requester verified.
    pub async fn review_verification(
        &self,
        admin: &AdminProfile,
        request_id: Uuid,
        payload: ReviewVerificationPayload,
    ) -> Result<VerificationRequest> {
        let action = if payload.approved { "approved" } else { "rejected" };
        let comments = payload.comments.filter(|c| !c.trim().is_empty());
        let reason = payload.rejection_reason.filter(|r| !r.trim().is_empty());

        let mut tx = self.pool.begin().await?;
        let request = sqlx::query_as::<_, VerificationRequest>(
            r#"
            UPDATE verification_requests
            SET status = $2, reviewed_at = NOW(), reviewed_by = $3,
                reviewer_comments = $4, rejection_reason = $5, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(request_id)
        .bind(action)
        .bind(admin.user_id)
        .bind(&comments)
        .bind(&reason)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::NotFound("Verification request not found".into()))?;

        let mut profile_change = None;
        if payload.approved {
            let before = Self::profile_for_update(&mut tx, request.user_id).await?;
            let after = sqlx::query_as::<_, Profile>(
                "UPDATE profiles SET is_verified = TRUE, updated_at = NOW() WHERE id = $1 RETURNING *",
            )
            .bind(request.user_id)
            .fetch_one(&mut *tx)
            .await?;
            profile_change = Some((before, after));
        }

        let note = comments
            .as_deref()
            .or(reason.as_deref())
            .unwrap_or("No comments");
        log_admin_activity(
            &mut tx,
            AdminAction {
                admin_id: admin.user_id,
                action_type: "verification_review",
                description: format!("{} verification request with comments: {}", action, note),
                target_type: Some("verification_request"),
                target_id: Some(request_id),
                metadata: None,
            },
        )
        .await?;
        tx.commit().await?;

        tracing::info!(request_id = %request_id, action, "verification reviewed");
        if let Some((before, after)) = profile_change {
            self.bus.publish_update(Table::Profiles, &before, &after);
        }
        Ok(request)
    }

    /// Super-admin initiated recovery for another user.
    pub async fn reset_password(
        &self,
        caller_user_id: Uuid,
        payload: AdminResetPasswordPayload,
        origin: RequestOrigin,
    ) -> Result<AdminResetPasswordResponse> {
        let admin = self.require_super_admin(caller_user_id).await?;

        let target_user: Option<Uuid> =
            sqlx::query_scalar("SELECT user_id FROM profiles WHERE id = $1")
                .bind(payload.target_user_id)
                .fetch_optional(&self.pool)
                .await?;
        let Some(target_user) = target_user else {
            return Err(Error::NotFound("Target user not found".into()));
        };

        let email: Option<String> = sqlx::query_scalar("SELECT email FROM auth_users WHERE id = $1")
            .bind(target_user)
            .fetch_optional(&self.pool)
            .await?;
        let Some(email) = email.filter(|e| !e.is_empty()) else {
            return Err(Error::NotFound("Failed to get user email".into()));
        };

        if let Err(e) = self.recovery.send_recovery(target_user, &email).await {
            tracing::error!(error = ?e, "password reset dispatch failed");
            return Err(Error::Internal("Failed to initiate password reset".into()));
        }

        let reason = payload
            .reset_reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_RESET_REASON.to_string());
        if let Err(e) = self
            .record_reset(&admin, payload.target_user_id, &reason, origin)
            .await
        {
            tracing::error!(error = ?e, "failed to record password reset");
        }

        tracing::info!(target = %payload.target_user_id, "password reset initiated by admin");
        Ok(AdminResetPasswordResponse {
            success: true,
            message: "Password reset email sent successfully".to_string(),
        })
    }

    async fn record_reset(
        &self,
        admin: &AdminProfile,
        target_profile: Uuid,
        reason: &str,
        origin: RequestOrigin,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO password_resets (target_user_id, reset_by_admin_id, reset_reason, ip_address, user_agent)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(target_profile)
        .bind(admin.user_id)
        .bind(reason)
        .bind(origin.ip_address)
        .bind(origin.user_agent)
        .execute(&mut *tx)
        .await?;
        log_admin_activity(
            &mut tx,
            AdminAction {
                admin_id: admin.user_id,
                action_type: "password_reset",
                description: format!("Reset password: {}", reason),
                target_type: Some("profile"),
                target_id: Some(target_profile),
                metadata: None,
            },
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }
}
