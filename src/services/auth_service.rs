use crate::config::get_config;
use crate::dto::auth_dto::{
    PasswordResetConfirmPayload, SessionResponse, SignInPayload, SignUpPayload,
};
use crate::error::{Error, Result};
use crate::middleware::auth::issue_token;
use crate::models::profile::{Profile, UserStatus};
use crate::realtime::{ChangeBus, ChangeKind, Table};
use crate::services::recovery_service::RecoveryService;
use crate::utils::crypto::{hash_password, verify_password};
use crate::utils::validation::non_blank;
use sqlx::PgPool;
use uuid::Uuid;

const BAD_CREDENTIALS: &str = "Invalid email or password";

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn hash(plain: &str) -> Result<String> {
    hash_password(plain).map_err(|e| Error::Internal(format!("Password hashing failed: {}", e)))
}

#[derive(Clone)]
pub struct AuthService {
    pool: PgPool,
    bus: ChangeBus,
    recovery: RecoveryService,
}

impl AuthService {
    pub fn new(pool: PgPool, bus: ChangeBus, recovery: RecoveryService) -> Self {
        Self {
            pool,
            bus,
            recovery,
        }
    }

    fn session_for(profile: Profile) -> Result<SessionResponse> {
        let access_token = issue_token(profile.user_id, profile.id, Some(profile.role.as_str()))?;
        Ok(SessionResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: get_config().jwt_ttl_seconds,
            profile,
        })
    }

    /// Creates the credential and its profile together.
    pub async fn sign_up(&self, payload: SignUpPayload) -> Result<SessionResponse> {
        let email = normalize_email(&payload.email);
        let password_hash = hash(&payload.password)?;

        let mut tx = self.pool.begin().await?;
        let user_id: Uuid = sqlx::query_scalar(
            "INSERT INTO auth_users (email, password_hash) VALUES ($1, $2) RETURNING id",
        )
        .bind(&email)
        .bind(password_hash)
        .fetch_one(&mut *tx)
        .await?;

        let profile = sqlx::query_as::<_, Profile>(
            r#"
            INSERT INTO profiles (user_id, role, full_name, phone)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(payload.role)
        .bind(payload.full_name.trim())
        .bind(non_blank(payload.phone.as_deref()))
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(profile_id = %profile.id, role = profile.role.as_str(), "account created");
        self.bus.publish(Table::Profiles, ChangeKind::Insert, &profile);
        Self::session_for(profile)
    }

    pub async fn sign_in(&self, payload: SignInPayload) -> Result<SessionResponse> {
        let email = normalize_email(&payload.email);
        let row: Option<(Uuid, String)> =
            sqlx::query_as("SELECT id, password_hash FROM auth_users WHERE email = $1")
                .bind(&email)
                .fetch_optional(&self.pool)
                .await?;
        let Some((user_id, password_hash)) = row else {
            return Err(Error::Unauthorized(BAD_CREDENTIALS.into()));
        };
        if !verify_password(&payload.password, &password_hash) {
            tracing::warn!(user_id = %user_id, "sign-in with wrong password");
            return Err(Error::Unauthorized(BAD_CREDENTIALS.into()));
        }

        let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .filter(|p| !p.is_deleted())
            .ok_or_else(|| Error::Unauthorized(BAD_CREDENTIALS.into()))?;

        match profile.user_status {
            UserStatus::Suspended => Err(Error::Forbidden("Your account has been suspended.".into())),
            UserStatus::Banned => Err(Error::Forbidden("Your account has been banned.".into())),
            UserStatus::Active | UserStatus::PendingApproval => Self::session_for(profile),
        }
    }

    /// Sends a recovery link when the email is known. Unknown emails succeed
    /// silently so the endpoint cannot be used to discover accounts.
    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        let email = normalize_email(email);
        let user_id: Option<Uuid> = sqlx::query_scalar("SELECT id FROM auth_users WHERE email = $1")
            .bind(&email)
            .fetch_optional(&self.pool)
            .await?;
        match user_id {
            Some(user_id) => self.recovery.send_recovery(user_id, &email).await,
            None => {
                tracing::debug!("password reset requested for unknown email");
                Ok(())
            }
        }
    }

    pub async fn confirm_password_reset(&self, payload: PasswordResetConfirmPayload) -> Result<()> {
        let password_hash = hash(&payload.new_password)?;
        let user_id = self.recovery.redeem(payload.token.trim(), &password_hash).await?;
        tracing::info!(user_id = %user_id, "password reset completed");
        Ok(())
    }
}
