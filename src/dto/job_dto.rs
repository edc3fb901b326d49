use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::application::APPLICATION_STATUSES;
use crate::models::job::JOB_STATUSES;

fn job_status(value: &str) -> Result<(), ValidationError> {
    if JOB_STATUSES.contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::new("job_status"))
    }
}

fn application_status(value: &str) -> Result<(), ValidationError> {
    if APPLICATION_STATUSES.contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::new("application_status"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateJobPayload {
    #[validate(length(min = 1))]
    pub title: String,
    #[validate(length(min = 1))]
    pub description: String,
    #[validate(length(min = 1))]
    pub location: String,
    #[validate(length(min = 1))]
    pub duration: String,
    #[validate(length(min = 1))]
    pub pay_rate: String,
    #[serde(default)]
    pub required_skills: Vec<String>,
    pub deadline: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateJobPayload {
    #[validate(length(min = 1))]
    pub title: Option<String>,
    #[validate(length(min = 1))]
    pub description: Option<String>,
    #[validate(length(min = 1))]
    pub location: Option<String>,
    #[validate(length(min = 1))]
    pub duration: Option<String>,
    #[validate(length(min = 1))]
    pub pay_rate: Option<String>,
    pub required_skills: Option<Vec<String>>,
    #[validate(custom(function = "job_status"))]
    pub status: Option<String>,
    pub deadline: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JobListQuery {
    pub search: Option<String>,
    pub skill: Option<String>,
    pub status: Option<String>,
    pub employer_id: Option<Uuid>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ApplyPayload {
    #[validate(length(max = 5000))]
    pub cover_letter: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateApplicationStatusPayload {
    #[validate(custom(function = "application_status"))]
    pub status: String,
}
