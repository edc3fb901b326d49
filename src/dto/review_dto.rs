use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateReviewPayload {
    pub reviewee_id: Uuid,
    pub job_id: Option<Uuid>,
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5 stars."))]
    pub rating: i16,
    #[validate(length(max = 2000))]
    pub review_text: Option<String>,
}
