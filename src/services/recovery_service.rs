use crate::error::{Error, Result};
use crate::utils::crypto::{generate_token, hash_token};
use chrono::{Duration, Utc};
use reqwest::Client;
use serde_json::json;
use sqlx::PgPool;
use url::Url;
use uuid::Uuid;

const TOKEN_LENGTH: usize = 48;
const TOKEN_TTL_MINUTES: i64 = 60;

/// Issues password recovery links and hands them to the mail webhook.
#[derive(Clone)]
pub struct RecoveryService {
    pool: PgPool,
    client: Client,
    app_url: String,
    webhook_url: Option<String>,
}

impl RecoveryService {
    pub fn new(pool: PgPool, app_url: String, webhook_url: Option<String>) -> Self {
        Self {
            pool,
            client: Client::new(),
            app_url,
            webhook_url,
        }
    }

    pub fn recovery_link(&self, token: &str) -> Result<String> {
        let mut link = Url::parse(&self.app_url)
            .and_then(|base| base.join("reset-password"))
            .map_err(|e| Error::Config(format!("Invalid APP_URL: {}", e)))?;
        link.query_pairs_mut().append_pair("token", token);
        Ok(link.into())
    }

    /// Stores a fresh single-use token for `user_id` and returns its link.
    pub async fn issue_link(&self, user_id: Uuid) -> Result<String> {
        let token = generate_token(TOKEN_LENGTH);
        let expires_at = Utc::now() + Duration::minutes(TOKEN_TTL_MINUTES);
        sqlx::query(
            "INSERT INTO recovery_tokens (user_id, token_hash, expires_at) VALUES ($1, $2, $3)",
        )
        .bind(user_id)
        .bind(hash_token(&token))
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        self.recovery_link(&token)
    }

    pub async fn deliver(&self, email: &str, link: &str) -> Result<()> {
        let Some(target) = &self.webhook_url else {
            tracing::info!(email = %email, link = %link, "recovery link issued (no webhook configured)");
            return Ok(());
        };

        let resp = self
            .client
            .post(target)
            .json(&json!({ "type": "recovery", "email": email, "link": link }))
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "recovery webhook rejected delivery");
            return Err(Error::Internal(format!(
                "Recovery webhook returned {}",
                status
            )));
        }
        Ok(())
    }

    pub async fn send_recovery(&self, user_id: Uuid, email: &str) -> Result<()> {
        let link = self.issue_link(user_id).await?;
        self.deliver(email, &link).await
    }

    /// Consumes `token` and stores `password_hash` for its owner.
    pub async fn redeem(&self, token: &str, password_hash: &str) -> Result<Uuid> {
        let mut tx = self.pool.begin().await?;
        let user_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE recovery_tokens SET used_at = NOW()
            WHERE token_hash = $1 AND used_at IS NULL AND expires_at > NOW()
            RETURNING user_id
            "#,
        )
        .bind(hash_token(token))
        .fetch_optional(&mut *tx)
        .await?;
        let Some(user_id) = user_id else {
            return Err(Error::BadRequest(
                "This reset link is invalid or has expired.".into(),
            ));
        };

        sqlx::query("UPDATE auth_users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(password_hash)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    #[tokio::test]
    async fn links_point_at_the_reset_page() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let service = RecoveryService::new(pool, "https://app.example.com/".into(), None);
        let link = service.recovery_link("abc123").unwrap();
        assert_eq!(link, "https://app.example.com/reset-password?token=abc123");

        let broken = RecoveryService::new(service.pool.clone(), "not a url".into(), None);
        assert!(broken.recovery_link("abc").is_err());
    }
}
