use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

/// SQLSTATE raised by Postgres for unique-key conflicts.
pub const UNIQUE_VIOLATION: &str = "23505";

/// Unique-constraint conflicts that have a user-facing meaning of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    AlreadyApplied,
    AlreadyPaid,
    AlreadyReviewed,
    EmailTaken,
}

impl ConflictKind {
    pub fn code(self) -> &'static str {
        match self {
            ConflictKind::AlreadyApplied => "already_applied",
            ConflictKind::AlreadyPaid => "already_paid",
            ConflictKind::AlreadyReviewed => "already_reviewed",
            ConflictKind::EmailTaken => "email_taken",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "already_applied" => Some(ConflictKind::AlreadyApplied),
            "already_paid" => Some(ConflictKind::AlreadyPaid),
            "already_reviewed" => Some(ConflictKind::AlreadyReviewed),
            "email_taken" => Some(ConflictKind::EmailTaken),
            _ => None,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            ConflictKind::AlreadyApplied => "You have already applied for this job.",
            ConflictKind::AlreadyPaid => "You have already made a payment for this job.",
            ConflictKind::AlreadyReviewed => "You have already reviewed this person for this job.",
            ConflictKind::EmailTaken => "An account with this email already exists.",
        }
    }

    fn from_constraint(name: &str) -> Option<Self> {
        match name {
            "unique_job_application" => Some(ConflictKind::AlreadyApplied),
            "unique_job_worker_payment" => Some(ConflictKind::AlreadyPaid),
            "unique_review" => Some(ConflictKind::AlreadyReviewed),
            "auth_users_email_key" => Some(ConflictKind::EmailTaken),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {}", .0.message())]
    Conflict(ConflictKind),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Token error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Message suitable for showing to the end user.
    pub fn user_message(&self) -> String {
        match self {
            Error::BadRequest(msg)
            | Error::Unauthorized(msg)
            | Error::Forbidden(msg)
            | Error::NotFound(msg) => msg.clone(),
            Error::Conflict(kind) => kind.message().to_string(),
            Error::Validation(err) => err.to_string(),
            _ => "An unexpected error occurred".to_string(),
        }
    }

    pub fn conflict_kind(&self) -> Option<ConflictKind> {
        match self {
            Error::Conflict(kind) => Some(*kind),
            _ => None,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let (status, code, error_message) = match self {
            Error::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Error::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            Error::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg),
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            Error::Conflict(kind) => (StatusCode::CONFLICT, kind.code(), kind.message().to_string()),
            Error::Validation(err) => (StatusCode::BAD_REQUEST, "validation", err.to_string()),
            Error::Json(err) => (StatusCode::BAD_REQUEST, "bad_request", err.to_string()),
            Error::Jwt(_) => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Invalid or expired token".to_string(),
            ),
            Error::Reqwest(err) => (
                StatusCode::BAD_GATEWAY,
                "upstream",
                format!("External service error: {}", err),
            ),
            Error::Database(err) => {
                tracing::error!(error = %err, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "An unexpected error occurred".to_string(),
                )
            }
            Error::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", msg),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                "An unexpected error occurred".to_string(),
            ),
        };

        let body = Json(json!({ "error": error_message, "code": code }));
        (status, body).into_response()
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        if matches!(err, sqlx::Error::RowNotFound) {
            return Error::NotFound("Resource not found".to_string());
        }
        let conflict = match &err {
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                db_err.constraint().and_then(ConflictKind::from_constraint)
            }
            _ => None,
        };
        match conflict {
            Some(kind) => Error::Conflict(kind),
            None => Error::Database(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_codes_round_trip_through_wire_codes() {
        for kind in [
            ConflictKind::AlreadyApplied,
            ConflictKind::AlreadyPaid,
            ConflictKind::AlreadyReviewed,
            ConflictKind::EmailTaken,
        ] {
            assert_eq!(ConflictKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(ConflictKind::from_code("teapot"), None);
    }

    #[test]
    fn payment_constraint_maps_to_already_paid() {
        assert_eq!(
            ConflictKind::from_constraint("unique_job_worker_payment"),
            Some(ConflictKind::AlreadyPaid)
        );
        assert_eq!(ConflictKind::from_constraint("some_other_key"), None);
    }

    #[test]
    fn conflict_renders_409_with_code() {
        let resp = Error::Conflict(ConflictKind::AlreadyPaid).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn user_message_hides_internal_details() {
        let err = Error::Internal("pool exhausted".into());
        assert_eq!(err.user_message(), "An unexpected error occurred");
        let err = Error::BadRequest("Please enter a valid amount.".into());
        assert_eq!(err.user_message(), "Please enter a valid amount.");
    }
}
