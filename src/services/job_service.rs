use crate::dto::job_dto::{CreateJobPayload, JobListQuery, UpdateJobPayload};
use crate::error::{Error, Result};
use crate::models::job::{Job, JobListing};
use crate::models::profile::{Profile, UserRole};
use crate::realtime::{ChangeBus, ChangeKind, Table};
use sqlx::PgPool;
use uuid::Uuid;

pub const VERIFICATION_REQUIRED: &str =
    "You must be verified before posting jobs. Please complete the verification process.";

const LISTING_SELECT: &str = r#"
    SELECT j.*,
           p.full_name AS employer_name,
           p.company_name AS company_name,
           (SELECT COUNT(*) FROM applications a WHERE a.job_id = j.id) AS application_count
    FROM jobs j
    LEFT JOIN profiles p ON p.id = j.employer_id
"#;

fn ensure_can_post(employer: &Profile) -> Result<()> {
    if employer.role != UserRole::Employer {
        return Err(Error::Forbidden("Only employers can post jobs.".into()));
    }
    if !employer.is_verified {
        return Err(Error::Forbidden(VERIFICATION_REQUIRED.into()));
    }
    Ok(())
}

#[derive(Clone)]
pub struct JobService {
    pool: PgPool,
    bus: ChangeBus,
}

impl JobService {
    pub fn new(pool: PgPool, bus: ChangeBus) -> Self {
        Self { pool, bus }
    }

    pub async fn create(&self, employer: &Profile, payload: CreateJobPayload) -> Result<Job> {
        ensure_can_post(employer)?;

        let job = sqlx::query_as::<_, Job>(
            r#"
            INSERT INTO jobs (
                employer_id, title, description, location, duration, pay_rate,
                required_skills, deadline
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(employer.id)
        .bind(payload.title.trim())
        .bind(payload.description.trim())
        .bind(payload.location.trim())
        .bind(payload.duration.trim())
        .bind(payload.pay_rate.trim())
        .bind(payload.required_skills)
        .bind(payload.deadline)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(job_id = %job.id, employer_id = %employer.id, "job posted");
        self.bus.publish(Table::Jobs, ChangeKind::Insert, &job);
        Ok(job)
    }

    pub async fn get(&self, id: Uuid) -> Result<Job> {
        sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound("Job not found".into()))
    }

    pub async fn get_listing(&self, id: Uuid) -> Result<JobListing> {
        let sql = format!("{} WHERE j.id = $1", LISTING_SELECT);
        sqlx::query_as::<_, JobListing>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound("Job not found".into()))
    }

    pub async fn update(
        &self,
        employer: &Profile,
        id: Uuid,
        payload: UpdateJobPayload,
    ) -> Result<Job> {
        let before = self.get(id).await?;
        if before.employer_id != employer.id {
            return Err(Error::Forbidden("You can only edit your own jobs.".into()));
        }
        ensure_can_post(employer)?;

        let after = sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs SET
                title = COALESCE($2, title),
                description = COALESCE($3, description),
                location = COALESCE($4, location),
                duration = COALESCE($5, duration),
                pay_rate = COALESCE($6, pay_rate),
                required_skills = COALESCE($7, required_skills),
                status = COALESCE($8, status),
                deadline = COALESCE($9, deadline),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(payload.title)
        .bind(payload.description)
        .bind(payload.location)
        .bind(payload.duration)
        .bind(payload.pay_rate)
        .bind(payload.required_skills)
        .bind(payload.status)
        .bind(payload.deadline)
        .fetch_one(&self.pool)
        .await?;

        self.bus.publish_update(Table::Jobs, &before, &after);
        Ok(after)
    }

    /// Job board listing. Defaults to open jobs, newest first.
    pub async fn list(&self, query: JobListQuery) -> Result<Vec<JobListing>> {
        let limit = query.limit.unwrap_or(50).clamp(1, 200);
        let mut filters = Vec::new();
        let mut args: Vec<String> = Vec::new();

        match query.status.as_deref() {
            Some("all") => {}
            Some(status) => {
                args.push(status.to_string());
                filters.push(format!("j.status = ${}", args.len()));
            }
            None if query.employer_id.is_none() => filters.push("j.status = 'open'".to_string()),
            None => {}
        }
        if let Some(employer_id) = query.employer_id {
            args.push(employer_id.to_string());
            filters.push(format!("j.employer_id = ${}::uuid", args.len()));
        }
        if let Some(search) = query.search.filter(|s| !s.trim().is_empty()) {
            args.push(format!("%{}%", search.trim()));
            filters.push(format!(
                "(j.title ILIKE ${0} OR j.description ILIKE ${0} OR j.location ILIKE ${0})",
                args.len()
            ));
        }
        if let Some(skill) = query.skill.filter(|s| !s.trim().is_empty()) {
            args.push(format!("%{}%", skill.trim()));
            filters.push(format!(
                "EXISTS (SELECT 1 FROM unnest(j.required_skills) s WHERE s ILIKE ${})",
                args.len()
            ));
        }

        let where_clause = if filters.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", filters.join(" AND "))
        };
        let sql = format!(
            "{} {} ORDER BY j.created_at DESC LIMIT ${}",
            LISTING_SELECT,
            where_clause,
            args.len() + 1
        );

        let mut statement = sqlx::query_as::<_, JobListing>(&sql);
        for value in &args {
            statement = statement.bind(value);
        }
        let items = statement.bind(limit).fetch_all(&self.pool).await?;
        Ok(items)
    }

    pub async fn list_for_employer(&self, employer_id: Uuid) -> Result<Vec<JobListing>> {
        self.list(JobListQuery {
            status: Some("all".into()),
            employer_id: Some(employer_id),
            limit: Some(200),
            ..Default::default()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::profile::UserStatus;
    use chrono::Utc;

    fn profile(role: UserRole, verified: bool) -> Profile {
        let now = Utc::now();
        Profile {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            role,
            full_name: "Sita Sharma".into(),
            phone: None,
            company_name: None,
            bio: None,
            address: None,
            skills: None,
            profile_photo_url: None,
            resume_url: None,
            identity_document_url: None,
            certification_urls: None,
            is_verified: verified,
            approval_status: "approved".into(),
            approved_at: None,
            approved_by: None,
            rejection_reason: None,
            user_status: UserStatus::Active,
            deleted_at: None,
            deleted_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn only_verified_employers_may_post() {
        assert!(ensure_can_post(&profile(UserRole::Employer, true)).is_ok());

        let err = ensure_can_post(&profile(UserRole::Employer, false)).unwrap_err();
        assert_eq!(err.user_message(), VERIFICATION_REQUIRED);

        assert!(matches!(
            ensure_can_post(&profile(UserRole::Worker, true)),
            Err(Error::Forbidden(_))
        ));
    }
}
