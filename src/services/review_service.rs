use crate::dto::review_dto::CreateReviewPayload;
use crate::error::{Error, Result};
use crate::models::review::{RatingSummary, Review, ReviewWithContext};
use sqlx::PgPool;
use uuid::Uuid;

pub const RATING_OUT_OF_RANGE: &str = "Rating must be between 1 and 5 stars.";

pub fn validate_rating(rating: i16) -> Result<()> {
    if (1..=5).contains(&rating) {
        Ok(())
    } else {
        Err(Error::BadRequest(RATING_OUT_OF_RANGE.into()))
    }
}

#[derive(Clone)]
pub struct ReviewService {
    pool: PgPool,
}

impl ReviewService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, reviewer_id: Uuid, payload: CreateReviewPayload) -> Result<Review> {
        validate_rating(payload.rating)?;
        if payload.reviewee_id == reviewer_id {
            return Err(Error::BadRequest("You cannot review yourself.".into()));
        }

        let review = sqlx::query_as::<_, Review>(
            r#"
            INSERT INTO reviews (reviewer_id, reviewee_id, job_id, rating, review_text)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(reviewer_id)
        .bind(payload.reviewee_id)
        .bind(payload.job_id)
        .bind(payload.rating)
        .bind(payload.review_text.filter(|t| !t.trim().is_empty()))
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(review_id = %review.id, reviewee_id = %review.reviewee_id, "review submitted");
        Ok(review)
    }

    /// `calculate_average_rating` and `get_review_count` in one round trip.
    pub async fn rating_summary(&self, profile_id: Uuid) -> Result<RatingSummary> {
        let (average, count): (f64, i64) = sqlx::query_as(
            r#"
            SELECT COALESCE(ROUND(AVG(rating)::numeric, 1), 0)::float8, COUNT(*)
            FROM reviews
            WHERE reviewee_id = $1
            "#,
        )
        .bind(profile_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(RatingSummary { average, count })
    }

    pub async fn list_for(&self, profile_id: Uuid) -> Result<Vec<ReviewWithContext>> {
        let rows = sqlx::query_as::<_, ReviewWithContext>(
            r#"
            SELECT r.*,
                   p.full_name AS reviewer_name,
                   p.profile_photo_url AS reviewer_photo_url,
                   j.title AS job_title
            FROM reviews r
            JOIN profiles p ON p.id = r.reviewer_id
            LEFT JOIN jobs j ON j.id = r.job_id
            WHERE r.reviewee_id = $1
            ORDER BY r.created_at DESC
            "#,
        )
        .bind(profile_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratings_outside_one_to_five_are_rejected() {
        for ok in 1..=5 {
            assert!(validate_rating(ok).is_ok());
        }
        for bad in [0, 6, -1] {
            assert_eq!(
                validate_rating(bad).unwrap_err().user_message(),
                RATING_OUT_OF_RANGE
            );
        }
    }
}
