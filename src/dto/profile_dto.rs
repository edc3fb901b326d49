use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateProfilePayload {
    #[validate(length(min = 1))]
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub company_name: Option<String>,
    pub bio: Option<String>,
    pub address: Option<String>,
    pub skills: Option<Vec<String>>,
    pub profile_photo_url: Option<String>,
    pub resume_url: Option<String>,
    pub identity_document_url: Option<String>,
    pub certification_urls: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSearchQuery {
    pub skill: Option<String>,
    /// Matched against name and bio.
    pub search: Option<String>,
    pub location: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct VerificationRequestPayload {
    #[validate(length(min = 1))]
    pub verification_type: String,
    #[validate(length(min = 1, message = "At least one document is required"))]
    pub document_urls: Vec<String>,
}
