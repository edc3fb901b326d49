use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::error::Result;

/// Bearer token claims. `sub` is the credential id, `profile_id` the profile it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub profile_id: Uuid,
    pub exp: usize,
    pub role: Option<String>,
}

pub fn issue_token(user_id: Uuid, profile_id: Uuid, role: Option<&str>) -> Result<String> {
    let config = crate::config::get_config();
    let exp = (Utc::now().timestamp() + config.jwt_ttl_seconds).max(0) as usize;
    let claims = Claims {
        sub: user_id,
        profile_id,
        exp,
        role: role.map(str::to_string),
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )?;
    Ok(token)
}

pub fn decode_token(token: &str) -> Result<Claims> {
    let config = crate::config::get_config();
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )?;
    Ok(data.claims)
}

pub async fn require_bearer_auth(mut req: Request, next: Next) -> Response {
    let Some(auth_header) = req.headers().get(axum::http::header::AUTHORIZATION) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Missing authorization header", "code": "unauthorized"})),
        )
            .into_response();
    };
    let Ok(auth_str) = auth_header.to_str() else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Malformed authorization header", "code": "unauthorized"})),
        )
            .into_response();
    };
    let Some(token) = auth_str.strip_prefix("Bearer ") else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Bearer token required", "code": "unauthorized"})),
        )
            .into_response();
    };

    match decode_token(token) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(_) => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Invalid or expired token", "code": "unauthorized"})),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_decode_to_the_same_claims() {
        std::env::set_var("SERVER_ADDRESS", "127.0.0.1:0");
        std::env::set_var("DATABASE_URL", "postgres://localhost/unused");
        std::env::set_var("JWT_SECRET", "unit-test-secret");
        let _ = crate::config::init_config();

        let user = Uuid::new_v4();
        let profile = Uuid::new_v4();
        let token = issue_token(user, profile, Some("worker")).unwrap();
        let claims = decode_token(&token).unwrap();
        assert_eq!(claims.sub, user);
        assert_eq!(claims.profile_id, profile);
        assert_eq!(claims.role.as_deref(), Some("worker"));

        assert!(decode_token("not.a.token").is_err());
    }
}
